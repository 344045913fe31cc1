//! Request encoder
//!
//! Serializes a method name and its parameters into a command frame.
//!
//! ## Frame Format
//! ```text
//! ┌─────────┬─────────┬──────────────┬──────────┬───────────┬────────────┐
//! │ Len (2) │ Mlen(1) │ DataLen (8)? │ Method   │ Count (1) │ Params ... │
//! └─────────┴─────────┴──────────────┴──────────┴───────────┴────────────┘
//! ```
//! All integers are little-endian. Bit 0x80 of `Mlen` announces the
//! optional data length. `Len` covers everything after itself.
//!
//! ### Parameter Encoding
//! - string: `klen` + key + value_len (4) + value
//! - number: `klen | 0x40` + key + value (8)
//! - bool:   `klen | 0x80` + key + value (1)

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{BinapiError, Result};
use super::{ParamValue, Params};

/// Size of the frame length prefix
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Exclusive upper bound on the frame body length
pub const MAX_FRAME_BODY: usize = 1 << 16;

/// Exclusive upper bound on the method name length
pub const MAX_METHOD_LEN: usize = 128;

/// Exclusive upper bound on a parameter key length
pub const MAX_KEY_LEN: usize = 64;

/// Maximum number of parameters in one command
pub const MAX_PARAMS: usize = 255;

const FLAG_HAS_DATA: u8 = 0x80;
const FLAG_NUMBER: u8 = 0x40;
const FLAG_BOOL: u8 = 0x80;

/// A fully encoded command, length prefix included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
    payload_len: Option<u64>,
}

impl Frame {
    /// Complete wire bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Body bytes (everything after the length prefix)
    pub fn body(&self) -> &[u8] {
        &self.bytes[LENGTH_PREFIX_SIZE..]
    }

    /// Total wire length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw payload length announced by this frame
    pub fn payload_len(&self) -> Option<u64> {
        self.payload_len
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Normalized parameter value after coercion
enum Scalar<'a> {
    Str(std::borrow::Cow<'a, [u8]>),
    Number(u64),
    Bool(bool),
}

/// Encode a command into a frame
///
/// `payload_len` announces raw bytes that will follow the frame on the
/// channel. Pure: nothing is written anywhere.
pub fn encode(method: &str, params: &Params, payload_len: Option<u64>) -> Result<Frame> {
    let method_bytes = method.as_bytes();
    if method_bytes.len() >= MAX_METHOD_LEN {
        return Err(BinapiError::Encoding(format!(
            "Method name too long: {} bytes (max {})",
            method_bytes.len(),
            MAX_METHOD_LEN - 1
        )));
    }
    if params.len() > MAX_PARAMS {
        return Err(BinapiError::Encoding(format!(
            "Too many parameters: {} (max {})",
            params.len(),
            MAX_PARAMS
        )));
    }

    let mut body = BytesMut::with_capacity(64 + method_bytes.len());

    let mut method_len = method_bytes.len() as u8;
    if payload_len.is_some() {
        method_len |= FLAG_HAS_DATA;
    }
    body.put_u8(method_len);
    if let Some(len) = payload_len {
        body.put_u64_le(len);
    }
    body.put_slice(method_bytes);
    body.put_u8(params.len() as u8);

    for (key, value) in params.iter() {
        encode_param(&mut body, key, value)?;
    }

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    frame.put_u16_le(body.len() as u16);
    frame.extend_from_slice(&body);

    tracing::trace!("Encoded {} frame: {} bytes", method, frame.len());

    Ok(Frame {
        bytes: frame.freeze(),
        payload_len,
    })
}

fn encode_param(body: &mut BytesMut, key: &str, value: &ParamValue) -> Result<()> {
    let key_bytes = key.as_bytes();
    if key_bytes.len() >= MAX_KEY_LEN {
        return Err(BinapiError::Encoding(format!(
            "Parameter name too long: {:?} ({} bytes, max {})",
            key,
            key_bytes.len(),
            MAX_KEY_LEN - 1
        )));
    }
    let key_len = key_bytes.len() as u8;
    let scalar = coerce(key, value)?;

    // Checked before any bytes of the value are copied.
    let value_size = match &scalar {
        Scalar::Str(bytes) => 4 + bytes.len(),
        Scalar::Number(_) => 8,
        Scalar::Bool(_) => 1,
    };
    let size = body.len() + 1 + key_bytes.len() + value_size;
    if size >= MAX_FRAME_BODY {
        return Err(BinapiError::FrameTooLarge { size });
    }

    match scalar {
        Scalar::Str(bytes) => {
            let len = u32::try_from(bytes.len()).map_err(|_| {
                BinapiError::Encoding(format!("Parameter {:?}: value too long", key))
            })?;
            body.put_u8(key_len);
            body.put_slice(key_bytes);
            body.put_u32_le(len);
            body.put_slice(&bytes);
        }
        Scalar::Number(n) => {
            body.put_u8(key_len | FLAG_NUMBER);
            body.put_slice(key_bytes);
            body.put_u64_le(n);
        }
        Scalar::Bool(b) => {
            body.put_u8(key_len | FLAG_BOOL);
            body.put_slice(key_bytes);
            body.put_u8(b as u8);
        }
    }
    Ok(())
}

/// Apply the negative-integer and list coercions
fn coerce<'a>(key: &str, value: &'a ParamValue) -> Result<Scalar<'a>> {
    use std::borrow::Cow;

    Ok(match value {
        ParamValue::Text(s) => Scalar::Str(Cow::Borrowed(s.as_bytes())),
        ParamValue::Bytes(b) => Scalar::Str(Cow::Borrowed(b.as_slice())),
        ParamValue::UInt(n) => Scalar::Number(*n),
        ParamValue::Int(n) if *n < 0 => Scalar::Str(Cow::Owned(n.to_string().into_bytes())),
        ParamValue::Int(n) => Scalar::Number(*n as u64),
        ParamValue::Bool(b) => Scalar::Bool(*b),
        ParamValue::List(items) => {
            let parts = items
                .iter()
                .map(|item| list_item(key, item))
                .collect::<Result<Vec<_>>>()?;
            Scalar::Str(Cow::Owned(parts.join(",").into_bytes()))
        }
    })
}

fn list_item(key: &str, item: &ParamValue) -> Result<String> {
    match item {
        ParamValue::Text(s) => Ok(s.clone()),
        ParamValue::UInt(n) => Ok(n.to_string()),
        ParamValue::Int(n) => Ok(n.to_string()),
        ParamValue::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        ParamValue::Bytes(_) | ParamValue::List(_) => Err(BinapiError::Encoding(format!(
            "Parameter {:?}: lists may only contain scalars",
            key
        ))),
    }
}
