//! Common error types for transport and MQTT session operations

/// A common error type for network and session operations.
///
/// This enum defines the errors the MQTT client can report. It is designed
/// to be small, `Copy` and portable for `no_std` environments. The precise
/// reason for a refused connection lives in
/// [`Client::state`](crate::network::application::mqtt::Client::state), not
/// in the error value.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// An operation was attempted on a session that is not connected.
    NotOpen,
    /// A write operation failed or wrote fewer bytes than requested.
    WriteError,
    /// An error occurred during a read operation.
    ReadError,
    /// The broker refused the connection with a non-zero CONNACK return code.
    ConnectionRefused,
    /// The transport could not open a connection to the server.
    ConnectFailed,
    /// No data arrived within the configured timeout.
    Timeout,
    /// The connection was closed.
    ConnectionClosed,
    /// An invalid server address or hostname was provided.
    InvalidAddress,
    /// A malformed or unexpected packet was received.
    ProtocolError,
    /// A packet does not fit in the working buffer.
    BufferOverflow,
    /// The requested quality of service is not supported for this operation.
    InvalidQoS,
    /// A configuration document could not be parsed.
    InvalidConfig,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotOpen => defmt::write!(f, "NotOpen"),
            Error::WriteError => defmt::write!(f, "WriteError"),
            Error::ReadError => defmt::write!(f, "ReadError"),
            Error::ConnectionRefused => defmt::write!(f, "ConnectionRefused"),
            Error::ConnectFailed => defmt::write!(f, "ConnectFailed"),
            Error::Timeout => defmt::write!(f, "Timeout"),
            Error::ConnectionClosed => defmt::write!(f, "ConnectionClosed"),
            Error::InvalidAddress => defmt::write!(f, "InvalidAddress"),
            Error::ProtocolError => defmt::write!(f, "ProtocolError"),
            Error::BufferOverflow => defmt::write!(f, "BufferOverflow"),
            Error::InvalidQoS => defmt::write!(f, "InvalidQoS"),
            Error::InvalidConfig => defmt::write!(f, "InvalidConfig"),
        }
    }
}
