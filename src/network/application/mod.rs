//! # Application Layer Network Protocols
//!
//! Application protocols built on the transport traits in
//! [`network`](crate::network).
//!
//! ## Design Principles
//!
//! - **Connection Agnostic**: Work with any type implementing [`Connection`](crate::network::Connection)
//! - **No-std Compatible**: Designed for embedded systems without heap allocation
//! - **Resource Conscious**: Use fixed-size buffers and minimal memory
//! - **Explicit Errors**: Every failure is a value the caller can inspect

/// MQTT client implementation.
///
/// Provides an MQTT 3.1 / 3.1.1 client for lightweight publish-subscribe
/// messaging over a single fixed-size packet buffer.
pub mod mqtt;
