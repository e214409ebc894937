//! # libpubsub - MQTT client for small devices
//!
//! A Rust MQTT client that keeps one connection to a broker and runs on a
//! tight resource budget: a single fixed-size packet buffer, no dynamic
//! allocation, and a cooperative `poll` call instead of background threads.
//! The library is designed for embedded systems and supports `no_std`
//! environments.
//!
//! ## Features
//!
//! - **MQTT 3.1 and 3.1.1**: CONNECT/CONNACK handshake with will, username
//!   and password
//! - **Publish/Subscribe**: QoS 0 publishing, QoS 0/1 subscriptions, PUBACK
//!   for incoming QoS 1 messages
//! - **Keepalive**: PINGREQ scheduling and timeout detection
//! - **Transport Agnostic**: works over any byte stream implementing the
//!   [`network`] traits
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! libpubsub = "0.1.0"
//! ```
//!
//! ### MQTT Client Example
//!
//! ```rust,no_run
//! use libpubsub::network::application::mqtt::{Client, Server};
//! # use core::net::Ipv4Addr;
//! # use libpubsub::network::{Close, Connect, Connection, Read, Write};
//! # struct MockConnection;
//! # impl Connection for MockConnection {}
//! # impl Read for MockConnection {
//! #     type Error = ();
//! #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
//! #     fn available(&mut self) -> Result<usize, Self::Error> { Ok(0) }
//! #     fn peek(&mut self) -> Result<Option<u8>, Self::Error> { Ok(None) }
//! # }
//! # impl Write for MockConnection {
//! #     type Error = ();
//! #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
//! #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Close for MockConnection {
//! #     type Error = ();
//! #     fn close(&mut self) -> Result<(), Self::Error> { Ok(()) }
//! # }
//! # impl Connect for MockConnection {
//! #     type Error = ();
//! #     fn connect_address(&mut self, _: Ipv4Addr, _: u16) -> Result<(), ()> { Ok(()) }
//! #     fn connect_host(&mut self, _: &str, _: u16) -> Result<(), ()> { Ok(()) }
//! #     fn is_connected(&self) -> bool { true }
//! # }
//! # fn millis() -> u32 { 0 }
//!
//! let server = Server::host("test.mosquitto.org", 1883).unwrap();
//! let mut client: Client<_, _, _> = Client::new(MockConnection, millis, server, |_: &str, _: &[u8]| {});
//!
//! // client.connect(&Options::new("my_device"))?;
//! // client.publish("sensors/temperature", b"23.5", false)?;
//! ```
//!
//! ## Platform Support
//!
//! This library is designed to work on:
//! - Embedded microcontrollers (ARM Cortex-M, RISC-V, etc.)
//! - Linux-based IoT devices (Raspberry Pi, etc.)
//! - Any platform supporting Rust's `core` library
//!
//! ## Optional Features
//!
//! - `std`: Enable the TCP transport and the `Instant`-based clock
//! - `defmt`: Enable defmt logging support for embedded debugging
//! - `mqtt-v3-1`: Announce MQTT 3.1 instead of 3.1.1 by default

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

mod fmt;

/// Network abstraction layer and the MQTT protocol engine.
///
/// Contains the transport traits the engine is written against and the MQTT
/// client built on them.
pub mod network;

/// Monotonic millisecond clock used for keepalive and read timeouts.
pub mod time;
