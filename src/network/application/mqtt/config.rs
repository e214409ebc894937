//! Build-time defaults and the runtime session configuration.

use crate::network::error::Error;
use serde::Deserialize;

/// Default working buffer capacity, the largest packet the client can send
/// or receive.
pub const MAX_PACKET_SIZE: usize = 128;

/// Default keepalive interval in seconds.
pub const KEEPALIVE_SECONDS: u16 = 15;

/// Default time to wait for a byte from the broker, in milliseconds.
pub const SOCKET_TIMEOUT_MS: u32 = 15_000;

/// Receive timeout applied by the TCP transport when it opens a socket.
pub const CONNECT_TIMEOUT_MS: u32 = 5_000;

/// Longest hostname the client can store.
pub const MAX_HOSTNAME_LEN: usize = 128;

/// MQTT protocol revision announced in CONNECT.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolVersion {
    /// MQTT 3.1, protocol name `MQIsdp`, level 3.
    #[serde(rename = "3.1")]
    V3_1,
    /// MQTT 3.1.1, protocol name `MQTT`, level 4.
    #[serde(rename = "3.1.1")]
    V3_1_1,
}

impl ProtocolVersion {
    /// Protocol name carried in the CONNECT variable header.
    pub const fn name(self) -> &'static str {
        match self {
            ProtocolVersion::V3_1 => "MQIsdp",
            ProtocolVersion::V3_1_1 => "MQTT",
        }
    }

    /// Protocol level byte.
    pub const fn level(self) -> u8 {
        match self {
            ProtocolVersion::V3_1 => 3,
            ProtocolVersion::V3_1_1 => 4,
        }
    }
}

impl Default for ProtocolVersion {
    #[cfg(feature = "mqtt-v3-1")]
    fn default() -> Self {
        ProtocolVersion::V3_1
    }

    #[cfg(not(feature = "mqtt-v3-1"))]
    fn default() -> Self {
        ProtocolVersion::V3_1_1
    }
}

/// Runtime settings for a [`Client`](super::Client).
///
/// # Examples
///
/// ```rust
/// use libpubsub::network::application::mqtt::{Config, ProtocolVersion};
///
/// let config = Config::from_json(r#"{"keep_alive_seconds": 30, "protocol": "3.1"}"#).unwrap();
/// assert_eq!(config.keep_alive_seconds, 30);
/// assert_eq!(config.protocol, ProtocolVersion::V3_1);
/// assert_eq!(config.socket_timeout_ms, 15_000);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Keepalive interval announced to the broker and used to schedule
    /// PINGREQ. Zero disables pings.
    pub keep_alive_seconds: u16,
    /// How long a blocking read waits for the next byte, in milliseconds.
    pub socket_timeout_ms: u32,
    /// Largest chunk handed to the transport per write call, `None` to
    /// write each packet in one call.
    pub max_transfer_size: Option<usize>,
    /// Protocol revision announced in CONNECT.
    pub protocol: ProtocolVersion,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keep_alive_seconds: KEEPALIVE_SECONDS,
            socket_timeout_ms: SOCKET_TIMEOUT_MS,
            max_transfer_size: None,
            protocol: ProtocolVersion::default(),
        }
    }
}

impl Config {
    /// Parse a configuration from a JSON document. Missing fields take their
    /// defaults.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let (config, _) =
            serde_json_core::from_str::<Config>(json).map_err(|_| Error::InvalidConfig)?;
        if config.max_transfer_size == Some(0) {
            return Err(Error::InvalidConfig);
        }
        Ok(config)
    }

    /// Keepalive interval in milliseconds.
    pub fn keep_alive_ms(&self) -> u32 {
        u32::from(self.keep_alive_seconds) * 1000
    }
}
