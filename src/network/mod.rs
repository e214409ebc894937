//! A transport abstraction layer for embedded systems
//!
//! The MQTT engine never talks to a socket directly. It drives any type that
//! implements the small set of traits in this module: opening a connection by
//! IPv4 address or hostname, querying how many bytes are ready, reading and
//! writing bytes, and closing. A blocking TCP implementation is provided in
//! [`tcp`] when the `std` feature is enabled.
//!

#![allow(missing_docs)]
#![deny(unsafe_code)]

use core::net::Ipv4Addr;

/// Common error types for network operations
pub mod error;

/// Application protocols built on the transport traits
pub mod application;

/// Blocking TCP transport backed by `std::net`
#[cfg(feature = "std")]
pub mod tcp;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Read, Write};
}

pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
    /// Number of bytes that can be read without blocking
    fn available(&mut self) -> Result<usize, Self::Error>;
    /// Look at the next byte without consuming it
    fn peek(&mut self) -> Result<Option<u8>, Self::Error>;

    /// Read a single byte, `None` if nothing was ready
    fn read_byte(&mut self) -> Result<Option<u8>, Self::Error> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }
}

pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Write a single byte
    fn write_byte(&mut self, byte: u8) -> Result<usize, Self::Error> {
        self.write(&[byte])
    }
}

pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection. The transport may be connected again afterwards.
    fn close(&mut self) -> Result<(), Self::Error>;
}

/// A reusable connector: the same transport value is opened, closed and
/// reopened across sessions.
pub trait Connect {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection to an IPv4 address
    fn connect_address(&mut self, address: Ipv4Addr, port: u16) -> Result<(), Self::Error>;
    /// Resolve a hostname and open a connection to it
    fn connect_host(&mut self, host: &str, port: u16) -> Result<(), Self::Error>;
    /// Whether the underlying connection is still open
    fn is_connected(&self) -> bool;
}

/// A synchronous, reconnectable byte-stream connection
pub trait Connection: Read + Write + Close + Connect {}
