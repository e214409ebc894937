//! MQTT client session for embedded systems.
//!
//! The [`Client`] owns one transport, one clock, one message callback and a
//! single fixed-size working buffer. Every packet, inbound or outbound, is
//! assembled in that buffer; nothing is allocated.
//!
//! # Control flow
//!
//! 1. Call [`Client::connect`] until it succeeds.
//! 2. Call [`Client::poll`] frequently. Each call services the keepalive
//!    timer and decodes at most one incoming packet, handing application
//!    messages to the callback.
//! 3. Call [`Client::publish`], [`Client::subscribe`] and
//!    [`Client::unsubscribe`] whenever the session is connected.
//!
//! The client never retries on its own. When [`Client::poll`] or
//! [`Client::is_connected`] reports the session is down, the caller decides
//! whether to connect again; [`Client::state`] tells why it went down.
//!
//! # Outbound buffer layout
//!
//! ```text
//!  0     1     2     3     4     5 ...
//! [ pad ][ pad ][hdr ][len ][len ][payload ...]
//! ```
//!
//! Payloads are written from offset 5. When the packet is sent, the header
//! byte and the 1-4 byte remaining-length field are placed immediately in
//! front of the payload and the contiguous region is written in one go.

use core::net::Ipv4Addr;

use heapless::String;

use super::config::{Config, MAX_HOSTNAME_LEN, MAX_PACKET_SIZE};
use super::packet::{
    CONNACK, CONNECT, DISCONNECT, HEADER_RESERVE, PINGREQ, PINGRESP, PUBACK, PUBLISH,
    PacketBuffer, Publish, QOS1_FLAG, QoS, RETAIN_FLAG, RemainingLength, SUBACK, SUBSCRIBE,
    TYPE_MASK, UNSUBACK, UNSUBSCRIBE,
};
use crate::fmt::{debug_log, trace_log, warn_log};
use crate::network::Connection;
use crate::network::error::Error;
use crate::time::{Clock, elapsed_ms};

/// Connect flag: clean session.
const CLEAN_SESSION: u8 = 0x02;
/// Connect flag: a will message follows the client id.
const WILL_FLAG: u8 = 0x04;
/// Connect flag: the will message is retained.
const WILL_RETAIN: u8 = 0x20;
/// Connect flag: a password follows.
const PASSWORD_FLAG: u8 = 0x40;
/// Connect flag: a username follows.
const USERNAME_FLAG: u8 = 0x80;

/// Receives application messages during [`Client::poll`].
///
/// The callback runs on the thread that services the protocol, so it must
/// return quickly. Any `FnMut(&str, &[u8])` closure is a callback.
pub trait Callback {
    /// Handle one message. `payload.len()` is the message length.
    fn on_message(&mut self, topic: &str, payload: &[u8]);
}

impl<F> Callback for F
where
    F: FnMut(&str, &[u8]),
{
    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        self(topic, payload)
    }
}

/// Connection status of a [`Client`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No CONNACK arrived in time, or the keepalive expired with a ping
    /// outstanding.
    ConnectionTimeout,
    /// The transport dropped while connected.
    ConnectionLost,
    /// The transport could not be opened, or the broker answered with
    /// something other than a CONNACK.
    ConnectFailed,
    /// Not connected. The initial state.
    Disconnected,
    /// Connected and accepted by the broker.
    Connected,
    /// CONNACK 1: unacceptable protocol version.
    BadProtocol,
    /// CONNACK 2: client identifier rejected.
    BadClientId,
    /// CONNACK 3: server unavailable.
    Unavailable,
    /// CONNACK 4: bad username or password.
    BadCredentials,
    /// CONNACK 5: not authorized.
    Unauthorized,
    /// A CONNACK return code this client does not know.
    Refused(u8),
}

impl State {
    /// Map a CONNACK return code to a state.
    pub fn from_return_code(code: u8) -> Self {
        match code {
            0 => State::Connected,
            1 => State::BadProtocol,
            2 => State::BadClientId,
            3 => State::Unavailable,
            4 => State::BadCredentials,
            5 => State::Unauthorized,
            other => State::Refused(other),
        }
    }

    /// Numeric status code: negative for local conditions, zero when
    /// connected, the CONNACK return code for broker rejections.
    ///
    /// ```rust
    /// use libpubsub::network::application::mqtt::State;
    ///
    /// assert_eq!(State::ConnectionTimeout.code(), -4);
    /// assert_eq!(State::Connected.code(), 0);
    /// assert_eq!(State::from_return_code(5).code(), 5);
    /// assert_eq!(State::from_return_code(9).code(), 9);
    /// ```
    pub fn code(&self) -> i16 {
        match self {
            State::ConnectionTimeout => -4,
            State::ConnectionLost => -3,
            State::ConnectFailed => -2,
            State::Disconnected => -1,
            State::Connected => 0,
            State::BadProtocol => 1,
            State::BadClientId => 2,
            State::Unavailable => 3,
            State::BadCredentials => 4,
            State::Unauthorized => 5,
            State::Refused(code) => i16::from(*code),
        }
    }
}

/// Where the broker lives.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Host {
    /// Connect straight to an IPv4 address.
    Address(Ipv4Addr),
    /// Resolve a hostname first.
    Name(String<MAX_HOSTNAME_LEN>),
}

/// Broker host and port.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Server {
    /// Address or hostname.
    pub host: Host,
    /// TCP port, usually 1883.
    pub port: u16,
}

impl Server {
    /// A broker reached by IPv4 address.
    pub fn address(address: Ipv4Addr, port: u16) -> Self {
        Self {
            host: Host::Address(address),
            port,
        }
    }

    /// A broker reached by hostname. Fails with [`Error::InvalidAddress`]
    /// if the name is empty or longer than [`MAX_HOSTNAME_LEN`].
    pub fn host(name: &str, port: u16) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::InvalidAddress);
        }
        let name = String::try_from(name).map_err(|_| Error::InvalidAddress)?;
        Ok(Self {
            host: Host::Name(name),
            port,
        })
    }
}

/// Last will and testament, published by the broker if this client
/// vanishes without sending DISCONNECT.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Will<'a> {
    /// Topic the will is published on.
    pub topic: &'a str,
    /// Will payload.
    pub message: &'a [u8],
    /// Delivery level for the will.
    pub qos: QoS,
    /// Whether the broker retains the will.
    pub retain: bool,
}

/// Per-connection options sent in CONNECT.
///
/// # Examples
///
/// ```rust
/// use libpubsub::network::application::mqtt::{Options, QoS, Will};
///
/// let options = Options::new("weather_station")
///     .with_credentials("user", Some("secret"))
///     .with_will(Will {
///         topic: "stations/weather/status",
///         message: b"offline",
///         qos: QoS::AtLeastOnce,
///         retain: true,
///     });
///
/// assert_eq!(options.username, Some("user"));
/// assert!(options.clean_session);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Options<'a> {
    /// The client identifier, unique per broker.
    pub client_id: &'a str,
    /// Optional username.
    pub username: Option<&'a str>,
    /// Optional password, only sent together with a username.
    pub password: Option<&'a str>,
    /// Optional last will.
    pub will: Option<Will<'a>>,
    /// Ask the broker to discard any previous session state.
    pub clean_session: bool,
}

impl<'a> Options<'a> {
    /// Options with only a client id and a clean session.
    pub fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            username: None,
            password: None,
            will: None,
            clean_session: true,
        }
    }

    /// Authenticate with a username and optional password.
    pub fn with_credentials(mut self, username: &'a str, password: Option<&'a str>) -> Self {
        self.username = Some(username);
        self.password = password;
        self
    }

    /// Register a last will.
    pub fn with_will(mut self, will: Will<'a>) -> Self {
        self.will = Some(will);
        self
    }
}

/// One decoded inbound packet sitting at the start of the working buffer.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Total bytes, fixed header included.
    len: usize,
    /// Width of the remaining-length field.
    length_len: usize,
}

/// An MQTT client session driven cooperatively by its owner.
///
/// # Type Parameters
///
/// * `C` - The transport implementing [`Connection`]
/// * `K` - The millisecond [`Clock`]
/// * `F` - The message [`Callback`]
/// * `N` - Working buffer capacity, the largest packet in either direction
///
/// # Examples
///
/// ```rust,no_run
/// use libpubsub::network::application::mqtt::{Client, Options, Server};
/// # use core::net::Ipv4Addr;
/// # use libpubsub::network::{Close, Connect, Connection, Read, Write};
/// # struct TcpConnection;
/// # impl Connection for TcpConnection {}
/// # impl Read for TcpConnection {
/// #     type Error = ();
/// #     fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> { Ok(0) }
/// #     fn available(&mut self) -> Result<usize, Self::Error> { Ok(0) }
/// #     fn peek(&mut self) -> Result<Option<u8>, Self::Error> { Ok(None) }
/// # }
/// # impl Write for TcpConnection {
/// #     type Error = ();
/// #     fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> { Ok(buf.len()) }
/// #     fn flush(&mut self) -> Result<(), Self::Error> { Ok(()) }
/// # }
/// # impl Close for TcpConnection {
/// #     type Error = ();
/// #     fn close(&mut self) -> Result<(), Self::Error> { Ok(()) }
/// # }
/// # impl Connect for TcpConnection {
/// #     type Error = ();
/// #     fn connect_address(&mut self, _: Ipv4Addr, _: u16) -> Result<(), ()> { Ok(()) }
/// #     fn connect_host(&mut self, _: &str, _: u16) -> Result<(), ()> { Ok(()) }
/// #     fn is_connected(&self) -> bool { true }
/// # }
/// # fn millis() -> u32 { 0 }
///
/// let server = Server::host("test.mosquitto.org", 1883).unwrap();
/// let mut client: Client<_, _, _> = Client::new(
///     TcpConnection,
///     millis,
///     server,
///     |topic: &str, payload: &[u8]| {
///         // handle the message
///         let _ = (topic, payload);
///     },
/// );
///
/// while client.connect(&Options::new("sensor_node_1")).is_err() {}
/// client.subscribe("commands/#", libpubsub::network::application::mqtt::QoS::AtLeastOnce).ok();
/// while client.poll().is_ok() {
///     client.publish("sensors/temperature", b"23.5", false).ok();
/// }
/// ```
pub struct Client<C, K, F, const N: usize = MAX_PACKET_SIZE>
where
    C: Connection,
    K: Clock,
    F: Callback,
{
    transport: C,
    clock: K,
    callback: F,
    server: Server,
    config: Config,
    state: State,
    buffer: PacketBuffer<N>,
    next_message_id: u16,
    last_in_activity: u32,
    last_out_activity: u32,
    ping_outstanding: bool,
}

impl<C, K, F, const N: usize> core::fmt::Debug for Client<C, K, F, N>
where
    C: Connection,
    K: Clock,
    F: Callback,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("server", &self.server)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("capacity", &N)
            .field("next_message_id", &self.next_message_id)
            .field("ping_outstanding", &self.ping_outstanding)
            .finish_non_exhaustive()
    }
}

impl<C, K, F, const N: usize> Client<C, K, F, N>
where
    C: Connection,
    K: Clock,
    F: Callback,
{
    /// Create a disconnected session with the default [`Config`].
    pub fn new(transport: C, clock: K, server: Server, callback: F) -> Self {
        const {
            assert!(
                N > HEADER_RESERVE + 2,
                "working buffer too small for any MQTT packet"
            )
        };
        let now = clock.now_ms();
        Self {
            transport,
            clock,
            callback,
            server,
            config: Config::default(),
            state: State::Disconnected,
            buffer: PacketBuffer::new(),
            next_message_id: 1,
            last_in_activity: now,
            last_out_activity: now,
            ping_outstanding: false,
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Change the configuration. Takes effect on the next operation; the
    /// keepalive announced to the broker changes on the next connect.
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }

    /// Current connection status.
    pub fn state(&self) -> State {
        self.state
    }

    /// The broker this session connects to.
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Target a broker by IPv4 address for the next connect.
    pub fn set_server_address(&mut self, address: Ipv4Addr, port: u16) {
        self.server = Server::address(address, port);
    }

    /// Target a broker by hostname for the next connect.
    pub fn set_server_host(&mut self, host: &str, port: u16) -> Result<(), Error> {
        self.server = Server::host(host, port)?;
        Ok(())
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &C {
        &self.transport
    }

    /// Mutably borrow the transport.
    pub fn transport_mut(&mut self) -> &mut C {
        &mut self.transport
    }

    /// Take the session apart.
    pub fn into_parts(self) -> (C, K, F) {
        (self.transport, self.clock, self.callback)
    }

    /// Open the transport and perform the CONNECT/CONNACK handshake.
    ///
    /// Succeeds immediately if the session is already connected. Blocks for
    /// up to [`Config::socket_timeout_ms`] waiting for the broker's answer.
    ///
    /// # Errors
    ///
    /// * [`Error::BufferOverflow`] - CONNECT does not fit the working
    ///   buffer; nothing was sent and the state is unchanged
    /// * [`Error::ConnectFailed`] - the transport could not be opened
    /// * [`Error::WriteError`] - CONNECT could not be sent
    /// * [`Error::Timeout`] - no answer in time, state is
    ///   [`State::ConnectionTimeout`]
    /// * [`Error::ConnectionRefused`] - the broker rejected the connection,
    ///   the reason is in [`Client::state`]
    /// * [`Error::ProtocolError`] - the answer was not a CONNACK
    pub fn connect(&mut self, options: &Options<'_>) -> Result<(), Error> {
        if self.is_connected() {
            return Ok(());
        }

        let length = self.encode_connect(options)?;

        let opened = match &self.server.host {
            Host::Address(address) => self.transport.connect_address(*address, self.server.port),
            Host::Name(name) => self.transport.connect_host(name, self.server.port),
        };
        if opened.is_err() {
            warn_log!("transport failed to open");
            self.state = State::ConnectFailed;
            return Err(Error::ConnectFailed);
        }

        self.next_message_id = 1;
        if let Err(e) = self.send(CONNECT, length) {
            self.fail(State::ConnectFailed);
            return Err(e);
        }

        let now = self.clock.now_ms();
        self.last_in_activity = now;
        self.last_out_activity = now;

        if let Err(e) = self.wait_available(self.last_in_activity) {
            warn_log!("no CONNACK before timeout");
            let state = match e {
                Error::Timeout => State::ConnectionTimeout,
                _ => State::ConnectFailed,
            };
            self.fail(state);
            return Err(e);
        }

        let frame = match self.read_packet() {
            Ok(frame) => frame,
            Err(e) => {
                let state = match e {
                    Error::Timeout => State::ConnectionTimeout,
                    _ => State::ConnectFailed,
                };
                self.fail(state);
                return Err(e);
            }
        };

        let header = self.buffer.get_u8(0)?;
        if frame.len != 4 || header & TYPE_MASK != CONNACK {
            warn_log!("expected CONNACK, got header {=u8:#x}", header);
            self.fail(State::ConnectFailed);
            return Err(Error::ProtocolError);
        }

        let code = self.buffer.get_u8(3)?;
        if code == 0 {
            debug_log!("connected");
            self.last_in_activity = self.clock.now_ms();
            self.ping_outstanding = false;
            self.state = State::Connected;
            return Ok(());
        }

        warn_log!("broker refused connection, code {=u8}", code);
        self.fail(State::from_return_code(code));
        Err(Error::ConnectionRefused)
    }

    /// Send DISCONNECT and close the transport.
    ///
    /// The session always ends up [`State::Disconnected`]; the error only
    /// reports that DISCONNECT itself could not be written.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        let sent = self.send(DISCONNECT, 0);
        self.state = State::Disconnected;
        self.close_transport();
        let now = self.clock.now_ms();
        self.last_in_activity = now;
        self.last_out_activity = now;
        sent
    }

    /// Whether the session is connected.
    ///
    /// If the transport dropped while the session was connected, the state
    /// moves to [`State::ConnectionLost`] and the transport is closed.
    pub fn is_connected(&mut self) -> bool {
        let open = self.transport.is_connected();
        if !open && self.state == State::Connected {
            warn_log!("connection lost");
            self.state = State::ConnectionLost;
            if self.transport.flush().is_err() {
                trace_log!("flush failed on lost connection");
            }
            self.close_transport();
        }
        open && self.state == State::Connected
    }

    /// Publish a QoS 0 message.
    ///
    /// # Errors
    ///
    /// * [`Error::BufferOverflow`] - `5 + 2 + topic.len() + payload.len()`
    ///   exceeds the buffer capacity; the transport is not touched
    /// * [`Error::NotOpen`] - the session is not connected
    /// * [`Error::WriteError`] - the transport accepted fewer bytes than the
    ///   packet holds
    pub fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), Error> {
        if HEADER_RESERVE + 2 + topic.len() + payload.len() > N {
            return Err(Error::BufferOverflow);
        }
        if !self.is_connected() {
            return Err(Error::NotOpen);
        }

        let pos = self.buffer.put_str(HEADER_RESERVE, topic)?;
        let pos = self.buffer.put_slice(pos, payload)?;
        let header = if retained {
            PUBLISH | RETAIN_FLAG
        } else {
            PUBLISH
        };
        self.send(header, pos - HEADER_RESERVE)
    }

    /// Subscribe to a topic filter at QoS 0 or 1.
    ///
    /// Returns the message id carried by the SUBSCRIBE. The SUBACK is not
    /// waited for.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidQoS`] - `qos` is [`QoS::ExactlyOnce`]
    /// * [`Error::BufferOverflow`] - the packet does not fit the buffer
    /// * [`Error::NotOpen`] - the session is not connected
    /// * [`Error::WriteError`] - the packet could not be sent
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, Error> {
        if qos == QoS::ExactlyOnce {
            return Err(Error::InvalidQoS);
        }
        // message id, topic length, topic, requested qos
        if HEADER_RESERVE + 2 + 2 + topic.len() + 1 > N {
            return Err(Error::BufferOverflow);
        }
        if !self.is_connected() {
            return Err(Error::NotOpen);
        }

        let id = self.allocate_message_id();
        let pos = self.buffer.put_u16(HEADER_RESERVE, id)?;
        let pos = self.buffer.put_str(pos, topic)?;
        let pos = self.buffer.put_u8(pos, qos as u8)?;
        self.send(SUBSCRIBE | QOS1_FLAG, pos - HEADER_RESERVE)?;
        Ok(id)
    }

    /// Unsubscribe from a topic filter.
    ///
    /// Returns the message id carried by the UNSUBSCRIBE. The UNSUBACK is
    /// not waited for.
    ///
    /// # Errors
    ///
    /// * [`Error::BufferOverflow`] - the packet does not fit the buffer
    /// * [`Error::NotOpen`] - the session is not connected
    /// * [`Error::WriteError`] - the packet could not be sent
    pub fn unsubscribe(&mut self, topic: &str) -> Result<u16, Error> {
        if HEADER_RESERVE + 2 + 2 + topic.len() > N {
            return Err(Error::BufferOverflow);
        }
        if !self.is_connected() {
            return Err(Error::NotOpen);
        }

        let id = self.allocate_message_id();
        let pos = self.buffer.put_u16(HEADER_RESERVE, id)?;
        let pos = self.buffer.put_str(pos, topic)?;
        self.send(UNSUBSCRIBE | QOS1_FLAG, pos - HEADER_RESERVE)?;
        Ok(id)
    }

    /// Service the keepalive timer and dispatch at most one incoming packet.
    ///
    /// Call this frequently. Incoming PUBLISH messages are handed to the
    /// callback from inside this call. Packets that cannot be decoded
    /// (too large for the buffer, malformed, or cut short by a timeout) are
    /// dropped without tearing the session down.
    ///
    /// # Errors
    ///
    /// * [`Error::NotOpen`] - the session is not connected
    /// * [`Error::Timeout`] - a keepalive interval passed with a ping still
    ///   unanswered; the state is [`State::ConnectionTimeout`]
    pub fn poll(&mut self) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotOpen);
        }

        let now = self.clock.now_ms();
        self.service_keepalive(now)?;

        if !matches!(self.transport.available(), Ok(n) if n > 0) {
            return Ok(());
        }

        match self.read_packet() {
            Ok(frame) => {
                self.last_in_activity = now;
                self.dispatch(frame);
            }
            Err(e) => {
                warn_log!("dropped incoming packet: {}", e);
                let _ = e;
            }
        }
        Ok(())
    }

    fn service_keepalive(&mut self, now: u32) -> Result<(), Error> {
        let interval = self.config.keep_alive_ms();
        if interval == 0 {
            return Ok(());
        }
        if elapsed_ms(now, self.last_in_activity) <= interval
            && elapsed_ms(now, self.last_out_activity) <= interval
        {
            return Ok(());
        }

        if self.ping_outstanding {
            warn_log!("keepalive expired with ping outstanding");
            self.fail(State::ConnectionTimeout);
            return Err(Error::Timeout);
        }

        trace_log!("sending PINGREQ");
        if self.send(PINGREQ, 0).is_err() {
            warn_log!("PINGREQ write failed");
        }
        self.last_out_activity = now;
        self.last_in_activity = now;
        self.ping_outstanding = true;
        Ok(())
    }

    fn dispatch(&mut self, frame: Frame) {
        let header = match self.buffer.get_u8(0) {
            Ok(header) => header,
            Err(_) => return,
        };

        match header & TYPE_MASK {
            PUBLISH => {
                let ack = match Publish::parse(&self.buffer, frame.len, frame.length_len) {
                    Ok(publish) => {
                        trace_log!("PUBLISH on {=str}", publish.topic);
                        self.callback.on_message(publish.topic, publish.payload);
                        match publish.qos {
                            QoS::AtMostOnce => None,
                            QoS::AtLeastOnce => publish.message_id,
                            QoS::ExactlyOnce => {
                                warn_log!("QoS 2 message delivered without acknowledgment");
                                None
                            }
                        }
                    }
                    Err(e) => {
                        warn_log!("malformed PUBLISH: {}", e);
                        let _ = e;
                        None
                    }
                };
                if let Some(id) = ack {
                    if self.send_puback(id).is_err() {
                        warn_log!("PUBACK write failed");
                    }
                }
            }
            PINGREQ => {
                if self.send(PINGRESP, 0).is_err() {
                    warn_log!("PINGRESP write failed");
                }
            }
            PINGRESP => {
                trace_log!("PINGRESP");
                self.ping_outstanding = false;
            }
            SUBACK | UNSUBACK => {
                debug_log!(
                    "acknowledgment {=u8:#x} for message {=u16}",
                    header,
                    self.buffer.get_u16(1 + frame.length_len).unwrap_or(0)
                );
            }
            _ => {
                trace_log!("ignoring packet {=u8:#x}", header);
            }
        }
    }

    fn send_puback(&mut self, id: u16) -> Result<(), Error> {
        self.buffer.put_u16(HEADER_RESERVE, id)?;
        self.send(PUBACK, 2)
    }

    /// Encode CONNECT into the buffer, returning the payload length.
    fn encode_connect(&mut self, options: &Options<'_>) -> Result<usize, Error> {
        let protocol = self.config.protocol;
        let mut pos = self.buffer.put_str(HEADER_RESERVE, protocol.name())?;
        pos = self.buffer.put_u8(pos, protocol.level())?;

        let mut flags = 0;
        if options.clean_session {
            flags |= CLEAN_SESSION;
        }
        if let Some(will) = &options.will {
            flags |= WILL_FLAG | ((will.qos as u8) << 3);
            if will.retain {
                flags |= WILL_RETAIN;
            }
        }
        if options.username.is_some() {
            flags |= USERNAME_FLAG;
            if options.password.is_some() {
                flags |= PASSWORD_FLAG;
            }
        }
        pos = self.buffer.put_u8(pos, flags)?;
        pos = self.buffer.put_u16(pos, self.config.keep_alive_seconds)?;

        pos = self.buffer.put_str(pos, options.client_id)?;
        if let Some(will) = &options.will {
            pos = self.buffer.put_str(pos, will.topic)?;
            pos = self.buffer.put_bytes(pos, will.message)?;
        }
        if let Some(username) = options.username {
            pos = self.buffer.put_str(pos, username)?;
            if let Some(password) = options.password {
                pos = self.buffer.put_str(pos, password)?;
            }
        }
        Ok(pos - HEADER_RESERVE)
    }

    /// Frame the payload at [`HEADER_RESERVE`] and hand it to the transport.
    fn send(&mut self, header: u8, payload_len: usize) -> Result<(), Error> {
        let (start, end) = self.buffer.frame(header, payload_len)?;
        let packet = self.buffer.slice(start, end)?;
        let chunk = self
            .config
            .max_transfer_size
            .unwrap_or(packet.len())
            .max(1);

        for part in packet.chunks(chunk) {
            let written = self
                .transport
                .write(part)
                .map_err(|_| Error::WriteError)?;
            if written != part.len() {
                warn_log!("short write: {=usize} of {=usize}", written, part.len());
                return Err(Error::WriteError);
            }
        }
        self.transport.flush().map_err(|_| Error::WriteError)?;
        self.last_out_activity = self.clock.now_ms();
        Ok(())
    }

    /// Read one complete packet into the buffer.
    ///
    /// A packet larger than the buffer is still drained from the transport
    /// so the stream stays aligned, then reported as
    /// [`Error::BufferOverflow`].
    fn read_packet(&mut self) -> Result<Frame, Error> {
        let header = self.read_byte()?;
        let mut len = self.buffer.put_u8(0, header)?;

        let mut length = RemainingLength::default();
        let remaining = loop {
            let digit = self.read_byte()?;
            len = self.buffer.put_u8(len, digit)?;
            if let Some(value) = length.push(digit)? {
                break value;
            }
        };

        let mut overflow = false;
        for _ in 0..remaining {
            let byte = self.read_byte()?;
            if self.buffer.put_u8(len, byte).is_err() {
                overflow = true;
            }
            len += 1;
        }

        if overflow {
            warn_log!("incoming packet of {=usize} bytes exceeds buffer", len);
            return Err(Error::BufferOverflow);
        }
        Ok(Frame {
            len,
            length_len: length.len(),
        })
    }

    /// Read one byte, waiting up to the socket timeout for it to arrive.
    fn read_byte(&mut self) -> Result<u8, Error> {
        let since = self.clock.now_ms();
        self.wait_available(since)?;
        self.transport
            .read_byte()
            .map_err(|_| Error::ReadError)?
            .ok_or(Error::ReadError)
    }

    /// Poll the transport until data is ready or the socket timeout has
    /// elapsed since `since`.
    fn wait_available(&mut self, since: u32) -> Result<(), Error> {
        loop {
            if self.transport.available().map_err(|_| Error::ReadError)? > 0 {
                return Ok(());
            }
            if elapsed_ms(self.clock.now_ms(), since) >= self.config.socket_timeout_ms {
                return Err(Error::Timeout);
            }
            core::hint::spin_loop();
        }
    }

    /// Next message id, never zero.
    fn allocate_message_id(&mut self) -> u16 {
        let id = self.next_message_id;
        self.next_message_id = match id.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        id
    }

    fn fail(&mut self, state: State) {
        self.state = state;
        self.close_transport();
    }

    fn close_transport(&mut self) {
        if self.transport.close().is_err() {
            warn_log!("transport close failed");
        }
    }
}
