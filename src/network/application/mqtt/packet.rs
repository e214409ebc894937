//! MQTT wire format: control packet types, the remaining-length codec, the
//! fixed-capacity working buffer, and the view over an incoming PUBLISH.

use crate::network::error::Error;

// MQTT Control Packet types - these are the fixed header packet type values
/// MQTT CONNECT packet type identifier.
pub const CONNECT: u8 = 0x10;
/// MQTT CONNACK packet type identifier.
pub const CONNACK: u8 = 0x20;
/// MQTT PUBLISH packet type identifier.
pub const PUBLISH: u8 = 0x30;
/// MQTT PUBACK packet type identifier.
pub const PUBACK: u8 = 0x40;
/// MQTT SUBSCRIBE packet type identifier.
pub const SUBSCRIBE: u8 = 0x80;
/// MQTT SUBACK packet type identifier.
pub const SUBACK: u8 = 0x90;
/// MQTT UNSUBSCRIBE packet type identifier.
pub const UNSUBSCRIBE: u8 = 0xA0;
/// MQTT UNSUBACK packet type identifier.
pub const UNSUBACK: u8 = 0xB0;
/// MQTT PINGREQ packet type identifier.
pub const PINGREQ: u8 = 0xC0;
/// MQTT PINGRESP packet type identifier.
pub const PINGRESP: u8 = 0xD0;
/// MQTT DISCONNECT packet type identifier.
pub const DISCONNECT: u8 = 0xE0;

/// Mask selecting the packet type nibble of a fixed header byte.
pub const TYPE_MASK: u8 = 0xF0;
/// QoS bits of a fixed header byte.
pub const QOS_MASK: u8 = 0x06;
/// QoS 1 flag, also required on SUBSCRIBE and UNSUBSCRIBE headers.
pub const QOS1_FLAG: u8 = 0x02;
/// Retain flag of a PUBLISH header.
pub const RETAIN_FLAG: u8 = 0x01;
/// Duplicate delivery flag of a PUBLISH header.
pub const DUP_FLAG: u8 = 0x08;

/// Bytes reserved in front of every outgoing payload for the fixed header
/// byte and up to four remaining-length bytes.
pub const HEADER_RESERVE: usize = 5;

/// Largest value the four-byte remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Quality of Service levels for MQTT messages.
///
/// # Examples
///
/// ```rust
/// use libpubsub::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::AtLeastOnce as u8, 1);
/// assert_eq!(QoS::try_from(2), Ok(QoS::ExactlyOnce));
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// **QoS 0**: At most once delivery, no acknowledgment.
    AtMostOnce = 0,
    /// **QoS 1**: At least once delivery, acknowledged with PUBACK.
    AtLeastOnce = 1,
    /// **QoS 2**: Exactly once delivery. Only usable for the last will and
    /// recognised on incoming messages; the assured delivery flow is not
    /// implemented.
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(Error::InvalidQoS),
        }
    }
}

/// Encode `len` as an MQTT remaining-length field.
///
/// The encoding uses up to 4 bytes where each byte carries 7 bits of the
/// value, least significant group first. The most significant bit marks that
/// another byte follows. Returns the encoded bytes and how many of them are
/// used.
pub fn encode_remaining_length(mut len: usize) -> Result<([u8; 4], usize), Error> {
    if len > MAX_REMAINING_LENGTH {
        return Err(Error::BufferOverflow);
    }
    let mut out = [0u8; 4];
    let mut used = 0;
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out[used] = byte;
        used += 1;
        if len == 0 {
            break;
        }
    }
    Ok((out, used))
}

/// Decode a remaining-length field from the start of `bytes`.
///
/// Returns the value and the number of bytes the field occupied. A field
/// whose fourth byte still has the continuation bit set is malformed.
pub fn decode_remaining_length(bytes: &[u8]) -> Result<(usize, usize), Error> {
    let mut decoder = RemainingLength::default();
    for (i, &byte) in bytes.iter().enumerate() {
        if let Some(value) = decoder.push(byte)? {
            return Ok((value, i + 1));
        }
    }
    Err(Error::ProtocolError)
}

/// Incremental remaining-length decoder, fed one byte at a time as bytes
/// arrive from the transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemainingLength {
    value: usize,
    multiplier: usize,
    count: usize,
}

impl RemainingLength {
    /// Feed the next byte. Returns `Some(value)` once the final byte (top bit
    /// clear) has been seen.
    pub fn push(&mut self, byte: u8) -> Result<Option<usize>, Error> {
        if self.count == 4 {
            return Err(Error::ProtocolError);
        }
        if self.count == 0 {
            self.multiplier = 1;
        }
        self.value += (byte & 0x7F) as usize * self.multiplier;
        self.multiplier *= 128;
        self.count += 1;
        if byte & 0x80 == 0 {
            Ok(Some(self.value))
        } else if self.count == 4 {
            Err(Error::ProtocolError)
        } else {
            Ok(None)
        }
    }

    /// Number of length bytes consumed so far.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no byte has been consumed yet.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Fixed-capacity working buffer shared by inbound packet assembly and
/// outbound packet construction.
///
/// Every accessor is bounds-checked and reports [`Error::BufferOverflow`]
/// instead of writing past the end, so a packet that does not fit is dropped
/// rather than corrupting the buffer.
#[derive(Debug, Clone)]
pub struct PacketBuffer<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> Default for PacketBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PacketBuffer<N> {
    /// A zeroed buffer.
    pub const fn new() -> Self {
        Self { bytes: [0; N] }
    }

    /// Buffer capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Store one byte at `pos`, returning the position after it.
    pub fn put_u8(&mut self, pos: usize, byte: u8) -> Result<usize, Error> {
        let slot = self.bytes.get_mut(pos).ok_or(Error::BufferOverflow)?;
        *slot = byte;
        Ok(pos + 1)
    }

    /// Store a big-endian `u16` at `pos`.
    pub fn put_u16(&mut self, pos: usize, value: u16) -> Result<usize, Error> {
        self.put_slice(pos, &value.to_be_bytes())
    }

    /// Copy `data` to `pos`.
    pub fn put_slice(&mut self, pos: usize, data: &[u8]) -> Result<usize, Error> {
        let end = pos.checked_add(data.len()).ok_or(Error::BufferOverflow)?;
        self.bytes
            .get_mut(pos..end)
            .ok_or(Error::BufferOverflow)?
            .copy_from_slice(data);
        Ok(end)
    }

    /// Store a length-prefixed UTF-8 string at `pos`: two big-endian length
    /// bytes followed by the raw bytes.
    pub fn put_str(&mut self, pos: usize, value: &str) -> Result<usize, Error> {
        self.put_bytes(pos, value.as_bytes())
    }

    /// Store length-prefixed binary data at `pos`.
    pub fn put_bytes(&mut self, pos: usize, data: &[u8]) -> Result<usize, Error> {
        let len = u16::try_from(data.len()).map_err(|_| Error::BufferOverflow)?;
        let end = pos
            .checked_add(2 + data.len())
            .filter(|&end| end <= N)
            .ok_or(Error::BufferOverflow)?;
        let pos = self.put_u16(pos, len)?;
        self.put_slice(pos, data)?;
        Ok(end)
    }

    /// Read a byte at `pos`.
    pub fn get_u8(&self, pos: usize) -> Result<u8, Error> {
        self.bytes.get(pos).copied().ok_or(Error::BufferOverflow)
    }

    /// Read a big-endian `u16` at `pos`.
    pub fn get_u16(&self, pos: usize) -> Result<u16, Error> {
        let hi = self.get_u8(pos)?;
        let lo = self.get_u8(pos + 1)?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    /// Read a length-prefixed string at `pos`, returning it and the position
    /// after it.
    pub fn get_str(&self, pos: usize) -> Result<(&str, usize), Error> {
        let len = self.get_u16(pos)? as usize;
        let start = pos + 2;
        let raw = self.slice(start, start + len)?;
        let value = core::str::from_utf8(raw).map_err(|_| Error::ProtocolError)?;
        Ok((value, start + len))
    }

    /// Borrow `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Result<&[u8], Error> {
        self.bytes.get(start..end).ok_or(Error::BufferOverflow)
    }

    /// The whole buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Place the fixed header in front of a payload of `payload_len` bytes
    /// stored at [`HEADER_RESERVE`], writing the length field backwards from
    /// the payload start. Returns the range of the finished packet.
    pub fn frame(&mut self, header: u8, payload_len: usize) -> Result<(usize, usize), Error> {
        let end = HEADER_RESERVE
            .checked_add(payload_len)
            .filter(|&end| end <= N)
            .ok_or(Error::BufferOverflow)?;
        let (length, used) = encode_remaining_length(payload_len)?;
        let start = HEADER_RESERVE - 1 - used;
        self.put_u8(start, header)?;
        self.put_slice(start + 1, &length[..used])?;
        Ok((start, end))
    }
}

/// A PUBLISH packet decoded in place from the working buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Publish<'a> {
    /// Topic the message was published on.
    pub topic: &'a str,
    /// Application payload.
    pub payload: &'a [u8],
    /// Delivery level requested by the sender.
    pub qos: QoS,
    /// Message id, present for QoS 1 and 2.
    pub message_id: Option<u16>,
    /// Whether the broker flagged the message as retained.
    pub retain: bool,
    /// Whether this is a redelivery.
    pub dup: bool,
}

impl<'a> Publish<'a> {
    /// Decode a PUBLISH occupying `buffer[..len]`, whose remaining-length
    /// field used `length_len` bytes.
    pub fn parse<const N: usize>(
        buffer: &'a PacketBuffer<N>,
        len: usize,
        length_len: usize,
    ) -> Result<Self, Error> {
        let header = buffer.get_u8(0)?;
        if header & TYPE_MASK != PUBLISH {
            return Err(Error::ProtocolError);
        }
        let qos = QoS::try_from((header & QOS_MASK) >> 1)?;
        let (topic, mut pos) = buffer.get_str(1 + length_len)?;
        let message_id = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce | QoS::ExactlyOnce => {
                let id = buffer.get_u16(pos)?;
                pos += 2;
                Some(id)
            }
        };
        if pos > len {
            return Err(Error::ProtocolError);
        }
        Ok(Self {
            topic,
            payload: buffer.slice(pos, len)?,
            qos,
            message_id,
            retain: header & RETAIN_FLAG != 0,
            dup: header & DUP_FLAG != 0,
        })
    }
}
