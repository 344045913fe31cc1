//! Binary Connection
//!
//! Owns one channel to the binary API and enforces the exchange rules:
//! a command frame (plus any payload) goes out, exactly one result comes
//! back, and any raw data announced by that result is drained before the
//! next command.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::Config;
use crate::error::{BinapiError, Result};
use crate::protocol::{encode, Frame, ParamValue, Params, Value};
use super::transfer::{drain_payload, Payload};
use super::Channel;

/// Name of the persistent parameter carrying the session token
pub const AUTH_PARAM: &str = "auth";

/// Connection speaking the binary protocol over a duplex stream
pub struct BinaryConnection<S: Read + Write = TcpStream> {
    /// Connection settings, including persistent parameters
    config: Config,

    /// Bound channel; `None` before connect and after close
    channel: Option<Channel<S>>,

    /// Set once a stream has been bound (connect may only happen once)
    bound: bool,

    /// A command has been sent and its result not read yet
    awaiting_result: bool,

    /// Raw bytes announced by the last result that are still on the wire
    pending_data: Option<u64>,
}

impl BinaryConnection<TcpStream> {
    /// Establish the TCP connection described by the config
    ///
    /// Tries every resolved address until one accepts.
    pub fn connect(&mut self) -> Result<&mut Self> {
        if self.bound {
            return Err(BinapiError::AlreadyConnected);
        }
        self.config.validate()?;

        let addr = self.config.address();
        let timeout = match self.config.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let mut last_err = None;
        for socket_addr in addr.to_socket_addrs()? {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(&socket_addr, t),
                None => TcpStream::connect(socket_addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_read_timeout(timeout)?;
                    stream.set_write_timeout(timeout)?;
                    stream.set_nodelay(true)?;
                    tracing::debug!("Connected to {} ({})", addr, socket_addr);
                    return self.connect_with(stream);
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", socket_addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{} did not resolve to any address", addr),
                )
            })
            .into())
    }
}

impl<S: Read + Write> BinaryConnection<S> {
    /// Create an unconnected connection
    pub fn new(config: Config) -> Self {
        Self {
            config,
            channel: None,
            bound: false,
            awaiting_result: false,
            pending_data: None,
        }
    }

    /// Bind an already connected stream (e.g. one wrapped in TLS)
    pub fn connect_with(&mut self, stream: S) -> Result<&mut Self> {
        if self.bound {
            return Err(BinapiError::AlreadyConnected);
        }
        self.config.validate()?;
        self.channel = Some(Channel::new(stream, self.config.chunk_size));
        self.bound = true;
        Ok(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a usable channel is bound
    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| !c.is_broken())
    }

    /// Current session token
    pub fn auth(&self) -> Option<&str> {
        match self.config.persistent_params.get(AUTH_PARAM) {
            Some(ParamValue::Text(token)) => Some(token.as_str()),
            _ => None,
        }
    }

    /// Set or clear the session token sent with every command
    pub fn set_auth(&mut self, token: Option<String>) {
        match token {
            Some(token) if !token.is_empty() => {
                self.config.persistent_params.set(AUTH_PARAM, token);
            }
            _ => {
                self.config.persistent_params.remove(AUTH_PARAM);
            }
        }
    }

    /// Send a command and wait for its result
    pub fn send_command(&mut self, method: &str, params: Params) -> Result<Value> {
        self.send_command_nb(method, params, None, |_| {})?;
        self.get_result()
    }

    /// Send a command followed by a raw payload and wait for its result
    pub fn send_command_with_data<F: FnMut(u64)>(
        &mut self,
        method: &str,
        params: Params,
        payload: Payload<'_>,
        on_progress: F,
    ) -> Result<Value> {
        self.send_command_nb(method, params, Some(payload), on_progress)?;
        self.get_result()
    }

    /// Send a command without reading its result
    ///
    /// Persistent parameters override same-named entries in `params`.
    /// Nothing is written if the payload length cannot be determined or
    /// the frame would be too large.
    pub fn send_command_nb<F: FnMut(u64)>(
        &mut self,
        method: &str,
        mut params: Params,
        mut payload: Option<Payload<'_>>,
        on_progress: F,
    ) -> Result<()> {
        self.ensure_idle()?;

        let payload_len = match payload.as_mut() {
            Some(p) => Some(p.determine_len()?),
            None => None,
        };
        params.merge(&self.config.persistent_params);
        let frame = encode(method, &params, payload_len)?;

        tracing::debug!(
            "Sending {} ({} params, frame {} bytes, payload {:?})",
            method,
            params.len(),
            frame.len(),
            payload_len
        );

        let channel = self.channel.as_mut().ok_or(BinapiError::NotConnected)?;
        if let Err(e) = transmit(channel, &frame, payload.as_mut(), on_progress) {
            channel.poison();
            return Err(e);
        }

        self.awaiting_result = true;
        Ok(())
    }

    /// Read the result of the last command
    ///
    /// If the result announces raw data, it must be drained with
    /// [`write_data`](Self::write_data) or [`data_reader`](Self::data_reader)
    /// before the next command.
    pub fn get_result(&mut self) -> Result<Value> {
        if let Some(remaining) = self.pending_data {
            return Err(BinapiError::PayloadPending { remaining });
        }
        let max_depth = self.config.max_depth;
        let channel = usable(&mut self.channel)?;
        if !self.awaiting_result {
            return Err(BinapiError::NoPendingResult);
        }
        self.awaiting_result = false;

        let value = channel.read_response(max_depth)?;

        let markers = value.data_markers();
        if markers.len() > 1 {
            channel.poison();
            return Err(BinapiError::Decode(format!(
                "Response announces {} raw data blocks; at most one is supported",
                markers.len()
            )));
        }
        self.pending_data = markers.first().copied().filter(|&len| len > 0);

        tracing::trace!("Result decoded, pending data: {:?}", self.pending_data);
        Ok(value)
    }

    /// Raw bytes announced by the last result and not yet drained
    pub fn pending_data(&self) -> Option<u64> {
        self.pending_data
    }

    /// Scoped reader over the pending raw data
    ///
    /// Reads end after exactly the announced byte count.
    pub fn data_reader(&mut self) -> Result<DataReader<'_, S>> {
        let channel = usable(&mut self.channel)?;
        Ok(DataReader {
            channel,
            pending: &mut self.pending_data,
        })
    }

    /// Drain the pending raw data into `sink`
    ///
    /// `length` must equal the announced count.
    pub fn write_data<W, F>(&mut self, sink: &mut W, length: u64, on_progress: F) -> Result<()>
    where
        W: Write + ?Sized,
        F: FnMut(u64),
    {
        let expected = self.pending_data.unwrap_or(0);
        if length != expected {
            return Err(BinapiError::LengthMismatch {
                expected,
                actual: length,
            });
        }
        let channel = usable(&mut self.channel)?;
        drain_payload(channel, sink, length, on_progress)?;
        self.pending_data = None;
        Ok(())
    }

    /// Flush and release the stream
    pub fn close(&mut self) -> Result<()> {
        let Some(mut channel) = self.channel.take() else {
            return Ok(());
        };
        tracing::debug!("Closing connection to {}", self.config.address());
        self.awaiting_result = false;
        self.pending_data = None;
        if channel.is_broken() {
            return Ok(());
        }
        channel.flush()
    }

    fn ensure_idle(&mut self) -> Result<()> {
        usable(&mut self.channel)?;
        if let Some(remaining) = self.pending_data {
            return Err(BinapiError::PayloadPending { remaining });
        }
        if self.awaiting_result {
            return Err(BinapiError::ExchangePending);
        }
        Ok(())
    }
}

fn usable<S: Read + Write>(channel: &mut Option<Channel<S>>) -> Result<&mut Channel<S>> {
    match channel {
        None => Err(BinapiError::NotConnected),
        Some(c) if c.is_broken() => Err(BinapiError::ChannelBroken),
        Some(c) => Ok(c),
    }
}

fn transmit<S, F>(
    channel: &mut Channel<S>,
    frame: &Frame,
    payload: Option<&mut Payload<'_>>,
    on_progress: F,
) -> Result<()>
where
    S: Read + Write,
    F: FnMut(u64),
{
    channel.write(frame.as_bytes())?;
    if let (Some(payload), Some(len)) = (payload, frame.payload_len()) {
        payload.send_to(channel, len, on_progress)?;
    }
    channel.flush()
}

/// Reader limited to the raw data announced by the last result
pub struct DataReader<'a, S: Read + Write> {
    channel: &'a mut Channel<S>,
    pending: &'a mut Option<u64>,
}

impl<S: Read + Write> DataReader<'_, S> {
    /// Bytes still to be read
    pub fn remaining(&self) -> u64 {
        self.pending.unwrap_or(0)
    }
}

impl<S: Read + Write> Read for DataReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.remaining();
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = remaining.min(buf.len() as u64) as usize;
        let n = self.channel.read(&mut buf[..want])?;
        if n == 0 {
            self.channel.poison();
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended with {} raw data bytes outstanding", remaining),
            ));
        }
        let left = remaining - n as u64;
        *self.pending = if left == 0 { None } else { Some(left) };
        Ok(n)
    }
}
