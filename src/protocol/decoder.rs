//! Response decoder
//!
//! Reads self-describing tagged values from a buffered byte source.
//!
//! ## Response Format
//! ```text
//! ┌──────────┬─────────────────────────────┐
//! │ Len (4)  │     Tagged value tree       │
//! └──────────┴─────────────────────────────┘
//! ```
//! The leading 4-byte field is opaque and is not validated.
//!
//! ### Tags
//! - 0-3:     new string, length in `tag + 1` bytes
//! - 100-149: new string, length `tag - 100`
//! - 4-7:     string back-reference, index in `tag - 3` bytes
//! - 150-199: string back-reference, index `tag - 150`
//! - 8-15:    integer in `tag - 7` bytes
//! - 200-219: integer `tag - 200`
//! - 16: map, 17: list (both closed by byte 255)
//! - 18: false, 19: true
//! - 20: raw data marker, length in 8 bytes
//!
//! Nesting is decoded with an explicit stack, bounded by `max_depth`.

use std::collections::BTreeMap;
use std::io::{BufRead, Read};

use crate::error::{BinapiError, Result};
use super::Value;

/// Size of the opaque field preceding every response
pub const RESPONSE_HEADER_SIZE: usize = 4;

/// Map/list end marker
pub const TERMINATOR: u8 = 255;

/// Per-response string interning table.
///
/// Indices are assigned in discovery order starting at 0.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a string, returning its index
    pub fn push(&mut self, s: String) -> usize {
        self.strings.push(s);
        self.strings.len() - 1
    }

    /// Resolve a back-reference
    pub fn get(&self, index: u64) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
            .ok_or_else(|| {
                BinapiError::Decode(format!(
                    "String back-reference {} out of range (table has {})",
                    index,
                    self.strings.len()
                ))
            })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Decode one complete response: the opaque header plus one value,
/// using a fresh string table.
///
/// On error the reader is left mid-response. Over a network channel use
/// `Channel::read_response`, which also breaks the channel.
pub fn decode_response<R: BufRead + ?Sized>(reader: &mut R, max_depth: usize) -> Result<Value> {
    let mut header = [0u8; RESPONSE_HEADER_SIZE];
    fill_exact(reader, &mut header)?;

    let mut table = StringTable::new();
    let value = decode_value(reader, &mut table, max_depth)?;

    tracing::trace!("Decoded response with {} interned strings", table.len());
    Ok(value)
}

/// Container under construction
enum Open {
    List(Vec<Value>),
    Map {
        entries: BTreeMap<Value, Value>,
        key: Option<Value>,
    },
}

/// Result of reading one tag
enum Item {
    Scalar(Value),
    OpenList,
    OpenMap,
}

/// Decode one value (no header) against the given string table
pub fn decode_value<R: BufRead + ?Sized>(
    reader: &mut R,
    table: &mut StringTable,
    max_depth: usize,
) -> Result<Value> {
    let mut stack: Vec<Open> = Vec::new();

    loop {
        // A terminator may only close a container at a key/element position.
        let at_item_start = match stack.last() {
            None => false,
            Some(Open::List(_)) => true,
            Some(Open::Map { key, .. }) => key.is_none(),
        };
        if at_item_start && peek_byte(reader)? == TERMINATOR {
            reader.consume(1);
            let closed = match stack.pop() {
                Some(Open::List(items)) => Value::List(items),
                Some(Open::Map { entries, .. }) => Value::Map(entries),
                None => return Err(BinapiError::Decode("Unbalanced terminator".to_string())),
            };
            if let Some(done) = attach(&mut stack, closed) {
                return Ok(done);
            }
            continue;
        }

        let value = match read_item(reader, table)? {
            Item::Scalar(value) => value,
            Item::OpenList | Item::OpenMap if stack.len() >= max_depth => {
                return Err(BinapiError::Decode(format!(
                    "Nesting exceeds maximum depth of {}",
                    max_depth
                )));
            }
            Item::OpenList => {
                stack.push(Open::List(Vec::new()));
                continue;
            }
            Item::OpenMap => {
                stack.push(Open::Map {
                    entries: BTreeMap::new(),
                    key: None,
                });
                continue;
            }
        };

        if let Some(done) = attach(&mut stack, value) {
            return Ok(done);
        }
    }
}

/// Place a finished value into the innermost open container.
/// Returns the value back when there is no container left.
fn attach(stack: &mut [Open], value: Value) -> Option<Value> {
    match stack.last_mut() {
        None => Some(value),
        Some(Open::List(items)) => {
            items.push(value);
            None
        }
        Some(Open::Map { entries, key }) => {
            match key.take() {
                Some(k) => {
                    entries.insert(k, value);
                }
                None => *key = Some(value),
            }
            None
        }
    }
}

fn read_item<R: BufRead + ?Sized>(reader: &mut R, table: &mut StringTable) -> Result<Item> {
    let tag = read_u8(reader)?;

    let item = match tag {
        0..=3 | 100..=149 => {
            let len = if tag >= 100 {
                (tag - 100) as u64
            } else {
                read_uint(reader, tag as usize + 1)?
            };
            let s = read_string(reader, len)?;
            table.push(s.clone());
            Item::Scalar(Value::String(s))
        }
        4..=7 => {
            let index = read_uint(reader, tag as usize - 3)?;
            Item::Scalar(Value::String(table.get(index)?.to_string()))
        }
        8..=15 => Item::Scalar(Value::Int(read_uint(reader, tag as usize - 7)?)),
        16 => Item::OpenMap,
        17 => Item::OpenList,
        18 => Item::Scalar(Value::Bool(false)),
        19 => Item::Scalar(Value::Bool(true)),
        20 => Item::Scalar(Value::Data(read_uint(reader, 8)?)),
        150..=199 => {
            let index = (tag - 150) as u64;
            Item::Scalar(Value::String(table.get(index)?.to_string()))
        }
        200..=219 => Item::Scalar(Value::Int((tag - 200) as u64)),
        TERMINATOR => {
            return Err(BinapiError::Decode(
                "Unexpected terminator in value position".to_string(),
            ))
        }
        _ => {
            return Err(BinapiError::Decode(format!(
                "Unknown value tag: {}",
                tag
            )))
        }
    };
    Ok(item)
}

/// Little-endian unsigned integer of `width` (1-8) bytes
fn read_uint<R: Read + ?Sized>(reader: &mut R, width: usize) -> Result<u64> {
    let mut buf = [0u8; 8];
    fill_exact(reader, &mut buf[..width])?;
    Ok(u64::from_le_bytes(buf))
}

fn read_u8<R: Read + ?Sized>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    fill_exact(reader, &mut buf)?;
    Ok(buf[0])
}

fn read_string<R: Read + ?Sized>(reader: &mut R, len: u64) -> Result<String> {
    // Grow with the data actually received rather than trusting `len`.
    let mut bytes = Vec::new();
    (&mut *reader).take(len).read_to_end(&mut bytes)?;
    if (bytes.len() as u64) < len {
        return Err(BinapiError::ShortRead {
            requested: len as usize,
            received: bytes.len(),
        });
    }
    String::from_utf8(bytes)
        .map_err(|e| BinapiError::Decode(format!("Invalid UTF-8 in string: {}", e)))
}

fn peek_byte<R: BufRead + ?Sized>(reader: &mut R) -> Result<u8> {
    loop {
        match reader.fill_buf() {
            Ok(buf) => {
                return buf.first().copied().ok_or(BinapiError::ShortRead {
                    requested: 1,
                    received: 0,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Fill `buf` completely or fail with `ShortRead`
pub(crate) fn fill_exact<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(BinapiError::ShortRead {
                    requested: buf.len(),
                    received: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
