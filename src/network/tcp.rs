//! Blocking TCP transport for hosted targets.

use core::net::Ipv4Addr;
use std::io::{ErrorKind, Read as StdRead, Write as StdWrite};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::network::application::mqtt::config::CONNECT_TIMEOUT_MS;
use crate::network::error::Error;
use crate::network::{Close, Connect, Connection, Read, Write};

/// Bytes inspected per `available` call.
const PEEK_WINDOW: usize = 256;

/// A [`Connection`] over `std::net::TcpStream`.
///
/// `available` peeks without blocking, so the MQTT client can poll it in a
/// loop against its own deadline. Reads use a receive timeout of
/// [`CONNECT_TIMEOUT_MS`] by default.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    read_timeout: Duration,
    peer_closed: bool,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    /// An unconnected transport.
    pub fn new() -> Self {
        Self::with_read_timeout(Duration::from_millis(u64::from(CONNECT_TIMEOUT_MS)))
    }

    /// An unconnected transport with a custom receive timeout.
    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        Self {
            stream: None,
            read_timeout,
            peer_closed: false,
        }
    }

    fn open<A: ToSocketAddrs>(&mut self, remote: A) -> Result<(), Error> {
        self.close()?;
        let stream = TcpStream::connect(remote).map_err(|e| match e.kind() {
            ErrorKind::ConnectionRefused => Error::ConnectionRefused,
            ErrorKind::TimedOut => Error::Timeout,
            _ => Error::ConnectFailed,
        })?;
        stream
            .set_read_timeout(Some(self.read_timeout))
            .map_err(|_| Error::ConnectFailed)?;
        stream.set_nodelay(true).map_err(|_| Error::ConnectFailed)?;
        self.stream = Some(stream);
        self.peer_closed = false;
        Ok(())
    }

    fn stream(&mut self) -> Result<&mut TcpStream, Error> {
        self.stream.as_mut().ok_or(Error::NotOpen)
    }

    fn peek_nonblocking(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let stream = self.stream()?;
        stream.set_nonblocking(true).map_err(|_| Error::ReadError)?;
        let peeked = stream.peek(buf);
        stream.set_nonblocking(false).map_err(|_| Error::ReadError)?;
        match peeked {
            Ok(0) => {
                self.peer_closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(_) => Err(Error::ReadError),
        }
    }
}

impl Read for TcpTransport {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.stream()?.read(buf).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                Error::Timeout
            } else {
                Error::ReadError
            }
        })
    }

    fn available(&mut self) -> Result<usize, Self::Error> {
        let mut window = [0u8; PEEK_WINDOW];
        self.peek_nonblocking(&mut window)
    }

    fn peek(&mut self) -> Result<Option<u8>, Self::Error> {
        let mut byte = [0u8; 1];
        match self.peek_nonblocking(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}

impl Write for TcpTransport {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.stream()?.write(buf).map_err(|_| Error::WriteError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream()?.flush().map_err(|_| Error::WriteError)
    }
}

impl Close for TcpTransport {
    type Error = Error;

    fn close(&mut self) -> Result<(), Self::Error> {
        if let Some(stream) = self.stream.take() {
            // The peer may already have gone away; the socket is dropped either way.
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.peer_closed = false;
        Ok(())
    }
}

impl Connect for TcpTransport {
    type Error = Error;

    fn connect_address(&mut self, address: Ipv4Addr, port: u16) -> Result<(), Self::Error> {
        self.open((address, port))
    }

    fn connect_host(&mut self, host: &str, port: u16) -> Result<(), Self::Error> {
        if host.is_empty() {
            return Err(Error::InvalidAddress);
        }
        self.open((host, port))
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.peer_closed
    }
}

impl Connection for TcpTransport {}
