//! # Connection Capability
//!
//! Purpose: Define the narrow interface the pool and the converters consume
//! (`exec`, `err`, `close`) and provide the RESP2-over-TCP implementation.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: The pool is generic over [`Conn`], so tests and
//!    alternate transports plug in without touching pooling logic.
//! 2. **Sticky Failure**: The first transport error taints the connection;
//!    later commands fail fast without touching the socket.
//! 3. **Buffer Reuse**: Each connection owns its read/write buffers.

use std::io::{self, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::BytesMut;
use rkv_common::{Reply, RkvError, RkvResult};
use tracing::{debug, warn};

use crate::resp::{encode_command, read_reply};

/// A protocol-serializable command argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Bytes(&'a [u8]),
    Str(&'a str),
    Int(i64),
    Float(f64),
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(value: &'a [u8]) -> Self {
        Arg::Bytes(value)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Arg<'a> {
    fn from(value: &'a [u8; N]) -> Self {
        Arg::Bytes(value)
    }
}

impl<'a> From<&'a Vec<u8>> for Arg<'a> {
    fn from(value: &'a Vec<u8>) -> Self {
        Arg::Bytes(value)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(value: &'a str) -> Self {
        Arg::Str(value)
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(value: &'a String) -> Self {
        Arg::Str(value)
    }
}

impl From<i64> for Arg<'_> {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg<'_> {
    fn from(value: i32) -> Self {
        Arg::Int(value as i64)
    }
}

impl From<f64> for Arg<'_> {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

/// A single live session with the store.
///
/// One instance serves one caller at a time; concurrency comes from holding
/// several connections, never from sharing one.
pub trait Conn: Send {
    /// Sends one command and reads exactly one reply.
    ///
    /// An error reply from the store is returned as `Ok(Reply::Error(..))`;
    /// only transport and framing failures are `Err`.
    fn exec(&mut self, cmd: &str, args: &[Arg<'_>]) -> RkvResult<Reply>;

    /// Returns the sticky fatal error, if one has been recorded.
    fn err(&self) -> Option<&str>;

    /// Releases the transport. Calling it more than once is a no-op.
    fn close(&mut self) -> RkvResult<()>;
}

impl<C: Conn + ?Sized> Conn for Box<C> {
    fn exec(&mut self, cmd: &str, args: &[Arg<'_>]) -> RkvResult<Reply> {
        (**self).exec(cmd, args)
    }

    fn err(&self) -> Option<&str> {
        (**self).err()
    }

    fn close(&mut self) -> RkvResult<()> {
        (**self).close()
    }
}

/// Transport options applied when dialing.
#[derive(Debug, Clone, Default)]
pub struct DialOptions {
    /// Optional TCP connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional TCP read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional TCP write timeout.
    pub write_timeout: Option<Duration>,
}

/// RESP2 connection over TCP with reusable buffers.
pub struct RespConnection {
    // Buffered reader reduces syscalls while still allowing direct writes.
    reader: Option<BufReader<TcpStream>>,
    line_buf: Vec<u8>,
    write_buf: BytesMut,
    sticky: Option<String>,
    peer: String,
}

impl RespConnection {
    /// Opens a TCP connection to `addr` and applies `options`.
    pub fn dial(addr: &str, options: &DialOptions) -> io::Result<Self> {
        let stream = connect_stream(addr, options.connect_timeout)?;
        stream.set_read_timeout(options.read_timeout)?;
        stream.set_write_timeout(options.write_timeout)?;
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;
        debug!(peer = %addr, "dialed connection");

        Ok(RespConnection {
            reader: Some(BufReader::new(stream)),
            line_buf: Vec::with_capacity(128),
            write_buf: BytesMut::with_capacity(256),
            sticky: None,
            peer: addr.to_string(),
        })
    }

    fn round_trip(&mut self, cmd: &str, args: &[Arg<'_>]) -> RkvResult<Reply> {
        let reader = self.reader.as_mut().ok_or(RkvError::Closed)?;

        self.write_buf.clear();
        encode_command(cmd, args, &mut self.write_buf);

        let stream = reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_reply(reader, &mut self.line_buf)
    }
}

impl Conn for RespConnection {
    fn exec(&mut self, cmd: &str, args: &[Arg<'_>]) -> RkvResult<Reply> {
        if self.reader.is_none() {
            return Err(RkvError::Closed);
        }
        if let Some(cause) = &self.sticky {
            return Err(RkvError::Tainted(cause.clone()));
        }

        let result = self.round_trip(cmd, args);
        if let Err(err) = &result {
            if err.is_fatal() {
                // A half-read reply leaves the stream out of sync; never reuse it.
                warn!(peer = %self.peer, command = cmd, error = %err, "connection tainted");
                self.sticky = Some(err.to_string());
            }
        }
        result
    }

    fn err(&self) -> Option<&str> {
        self.sticky.as_deref()
    }

    fn close(&mut self) -> RkvResult<()> {
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };
        if self.sticky.is_none() {
            self.sticky = Some(RkvError::Closed.to_string());
        }
        debug!(peer = %self.peer, "closing connection");
        match reader.into_inner().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn connect_stream(addr: &str, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let timeout = match timeout {
        Some(timeout) => timeout,
        None => return TcpStream::connect(addr),
    };

    let mut last_err = None;
    for candidate in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "address resolved to nothing")
    }))
}
