//! Framed Byte Channel
//!
//! Strict-read wrapper over a duplex byte stream. Every operation is
//! all-or-nothing; the first failure marks the channel broken and every
//! later operation fails fast with `ChannelBroken`.

use std::io::{self, BufRead, BufReader, Read, Write};

use crate::error::{BinapiError, Result};
use crate::protocol::{decode_response, fill_exact, Value};

/// Buffered duplex channel over a connected stream
pub struct Channel<S: Read + Write> {
    /// Read side (buffered, also provides peeking)
    reader: BufReader<S>,

    /// Pending outbound bytes
    write_buf: Vec<u8>,

    /// Flush threshold for `write_buf`
    chunk_size: usize,

    /// Set on the first failed operation
    broken: bool,
}

impl<S: Read + Write> Channel<S> {
    /// Wrap a connected stream
    pub fn new(stream: S, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            reader: BufReader::with_capacity(chunk_size, stream),
            write_buf: Vec::with_capacity(chunk_size),
            chunk_size,
            broken: false,
        }
    }

    /// Read exactly `n` bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` completely
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_usable()?;
        let result = fill_exact(&mut self.reader, buf);
        self.track(result)
    }

    /// Next byte without consuming it
    pub fn peek(&mut self) -> Result<u8> {
        self.ensure_usable()?;
        let result = loop {
            match self.reader.fill_buf() {
                Ok(buf) => {
                    break buf.first().copied().ok_or(BinapiError::ShortRead {
                        requested: 1,
                        received: 0,
                    })
                }
                Err(e) if is_retryable(&e) => continue,
                Err(e) => break Err(e.into()),
            }
        };
        self.track(result)
    }

    /// Decode one complete response from the channel
    ///
    /// A malformed response leaves the stream at an unknown position, so
    /// any failure breaks the channel.
    pub fn read_response(&mut self, max_depth: usize) -> Result<Value> {
        self.ensure_usable()?;
        let result = decode_response(self, max_depth);
        if result.is_err() {
            self.poison();
        }
        result
    }

    /// Queue all of `bytes` for sending, flushing full chunks
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_usable()?;
        self.write_buf.extend_from_slice(bytes);
        if self.write_buf.len() >= self.chunk_size {
            let result = self.drain_write_buf();
            self.track(result)?;
        }
        Ok(())
    }

    /// Force buffered writes out to the stream
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_usable()?;
        let result = self
            .drain_write_buf()
            .and_then(|_| self.reader.get_mut().flush().map_err(Into::into));
        self.track(result)
    }

    /// Mark the channel unusable (e.g. after a decode failure)
    pub fn poison(&mut self) {
        if !self.broken {
            tracing::warn!("Channel poisoned; it must be discarded");
        }
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Transfer chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Underlying stream
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Give back the stream, discarding buffered data
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.broken {
            return Err(BinapiError::ChannelBroken);
        }
        Ok(())
    }

    fn drain_write_buf(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.reader.get_mut().write_all(&self.write_buf)?;
        tracing::trace!("Wrote {} bytes to channel", self.write_buf.len());
        self.write_buf.clear();
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Err(BinapiError::Io(e)) if is_retryable(e) => {}
            Err(e) => {
                tracing::warn!("Channel operation failed: {}", e);
                self.broken = true;
            }
            Ok(_) => {}
        }
        result
    }
}

/// Errors after which the stream position is still known
fn is_retryable(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::Interrupted
}

fn broken_io() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel is broken")
}

impl<S: Read + Write> Read for Channel<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.broken {
            return Err(broken_io());
        }
        let result = self.reader.read(buf);
        if let Err(ref e) = result {
            if !is_retryable(e) {
                self.broken = true;
            }
        }
        result
    }
}

impl<S: Read + Write> BufRead for Channel<S> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.broken {
            return Err(broken_io());
        }
        match self.reader.fill_buf() {
            Ok(_) => {}
            Err(e) => {
                if !is_retryable(&e) {
                    self.broken = true;
                }
                return Err(e);
            }
        }
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt);
    }
}
