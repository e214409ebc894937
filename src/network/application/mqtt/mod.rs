//! MQTT 3.1 / 3.1.1 client for embedded systems.
//!
//! This module provides a small MQTT client designed for `no_std`
//! environments. A session keeps exactly one broker connection, encodes and
//! decodes the MQTT wire format inside a single fixed-size buffer, and drives
//! keepalive and message dispatch from a cooperative [`Client::poll`] call.
//!
//! # Protocol Overview
//!
//! MQTT uses a publish-subscribe pattern where:
//! - **Publishers** send messages to topics
//! - **Subscribers** receive messages from topics they're interested in
//! - **Brokers** route messages between publishers and subscribers
//!
//! # Scope
//!
//! - Publishing at QoS 0, optionally retained
//! - Subscribing at QoS 0 or 1; incoming QoS 1 messages are acknowledged
//! - Keepalive pings with timeout detection
//! - Last will, username and password
//! - No TLS, no QoS 2 flow, no session persistence across reconnects
//!
//! # Usage
//!
//! ```rust,no_run
//! use libpubsub::network::application::mqtt::{Client, Config, Options, QoS, Server};
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
//! let server = Server::address(Ipv4Addr::new(192, 168, 1, 10), 1883);
//! let on_message = |topic: &str, payload: &[u8]| {
//!     let _ = (topic, payload);
//! };
//! let mut client: Client<_, _, _, 256> =
//!     Client::new(MockConnection, millis, server, on_message).with_config(Config {
//!         keep_alive_seconds: 60,
//!         ..Config::default()
//!     });
//!
//! client.connect(&Options::new("iot_device_123")).unwrap();
//! client.subscribe("sensors/+", QoS::AtLeastOnce).unwrap();
//! client.publish("status", b"online", true).unwrap();
//! loop {
//!     if client.poll().is_err() {
//!         break;
//!     }
//! }
//! ```

/// The session: handshake, keepalive, dispatch and the outgoing operations.
pub mod client;

/// Build-time defaults and runtime configuration.
pub mod config;

/// Wire format primitives shared by the client.
pub mod packet;

pub use client::{Callback, Client, Host, Options, Server, State, Will};
pub use config::{Config, MAX_PACKET_SIZE, ProtocolVersion};
pub use packet::{Publish, QoS};
