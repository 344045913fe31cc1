//! Data Transfer
//!
//! Chunked streaming of raw payload bytes: outbound after a command frame,
//! inbound after a response that carries a raw-data marker.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{BinapiError, Result};
use super::Channel;

/// Readers that can also seek (used to derive a payload length)
pub trait SeekRead: Read + Seek {}

impl<T: Read + Seek> SeekRead for T {}

enum Source<'a> {
    Bytes(&'a [u8]),
    Reader {
        reader: &'a mut dyn Read,
        len: Option<u64>,
    },
    Seekable {
        reader: &'a mut dyn SeekRead,
        len: Option<u64>,
    },
}

/// Outbound raw payload attached to a command
pub struct Payload<'a> {
    source: Source<'a>,
}

impl<'a> Payload<'a> {
    /// In-memory bytes
    pub fn bytes(data: &'a [u8]) -> Self {
        Self {
            source: Source::Bytes(data),
        }
    }

    /// Plain reader; without `len` the payload cannot be sent
    pub fn reader(reader: &'a mut dyn Read, len: Option<u64>) -> Self {
        Self {
            source: Source::Reader { reader, len },
        }
    }

    /// Seekable reader; without `len` the length is measured from the
    /// current position to the end
    pub fn seekable(reader: &'a mut dyn SeekRead, len: Option<u64>) -> Self {
        Self {
            source: Source::Seekable { reader, len },
        }
    }

    /// Number of bytes this payload will send
    pub fn determine_len(&mut self) -> Result<u64> {
        match &mut self.source {
            Source::Bytes(data) => Ok(data.len() as u64),
            Source::Reader { len: Some(len), .. } | Source::Seekable { len: Some(len), .. } => {
                Ok(*len)
            }
            Source::Reader { len: None, .. } => Err(BinapiError::UndeterminedLength),
            Source::Seekable { reader, len } => {
                let measured = seek_len(&mut **reader)?;
                *len = Some(measured);
                Ok(measured)
            }
        }
    }

    /// Stream `length` bytes of this payload to the channel
    pub fn send_to<S, F>(&mut self, channel: &mut Channel<S>, length: u64, on_progress: F) -> Result<()>
    where
        S: Read + Write,
        F: FnMut(u64),
    {
        match &mut self.source {
            Source::Bytes(data) => send_payload(channel, data, length, on_progress),
            Source::Reader { reader, .. } => send_payload(channel, &mut **reader, length, on_progress),
            Source::Seekable { reader, .. } => send_payload(channel, &mut **reader, length, on_progress),
        }
    }
}

/// Remaining length of a seekable source, leaving its position unchanged
fn seek_len<R: Seek + ?Sized>(reader: &mut R) -> Result<u64> {
    let pos = reader.stream_position()?;
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(pos))?;
    Ok(end.saturating_sub(pos))
}

/// Copy exactly `length` bytes from `source` to the channel in chunks.
///
/// `on_progress` receives the size of each chunk written. A source that
/// runs dry early fails with `LengthMismatch`; a source that errors fails
/// with `Io`. Both poison the channel, since the peer is still waiting
/// for the announced bytes.
pub fn send_payload<S, R, F>(
    channel: &mut Channel<S>,
    source: &mut R,
    length: u64,
    mut on_progress: F,
) -> Result<()>
where
    S: Read + Write,
    R: Read + ?Sized,
    F: FnMut(u64),
{
    let mut buf = vec![0u8; channel.chunk_size()];
    let mut sent = 0u64;

    while sent < length {
        let want = (length - sent).min(buf.len() as u64) as usize;
        let got = match fill_from(source, &mut buf[..want]) {
            Ok(got) => got,
            Err(e) => {
                channel.poison();
                return Err(e);
            }
        };
        if got < want {
            channel.poison();
            return Err(BinapiError::LengthMismatch {
                expected: length,
                actual: sent + got as u64,
            });
        }
        channel.write(&buf[..got])?;
        sent += got as u64;
        on_progress(got as u64);
    }

    tracing::debug!("Sent {} payload bytes", sent);
    Ok(())
}

/// Copy exactly `length` bytes from the channel into `sink` in chunks.
///
/// Any failure leaves undrained bytes on the stream, so the channel is
/// poisoned.
pub fn drain_payload<S, W, F>(
    channel: &mut Channel<S>,
    sink: &mut W,
    length: u64,
    mut on_progress: F,
) -> Result<()>
where
    S: Read + Write,
    W: Write + ?Sized,
    F: FnMut(u64),
{
    let mut buf = vec![0u8; channel.chunk_size()];
    let mut drained = 0u64;

    while drained < length {
        let want = (length - drained).min(buf.len() as u64) as usize;
        channel.read_into(&mut buf[..want])?;
        if let Err(e) = sink.write_all(&buf[..want]) {
            channel.poison();
            return Err(e.into());
        }
        drained += want as u64;
        on_progress(want as u64);
    }

    tracing::debug!("Drained {} payload bytes", drained);
    Ok(())
}

/// Read until `buf` is full or the source ends; returns bytes read
fn fill_from<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
