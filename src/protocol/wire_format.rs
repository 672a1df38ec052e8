//! Wire format encoding and decoding.
//!
//! Every frame, on both the TCP and UDP channels, has the same shape:
//!
//! ```text
//! ┌─────────┬───────────┬───────────┬─────────────────────────────┐
//! │ Magic   │ Version   │ Length    │ Payload                     │
//! │ 2 bytes │ 2 bytes   │ 2 bytes   │ `Length` bytes              │
//! │ "UC"    │ uint16 LE │ uint16 LE │                             │
//! └─────────┴───────────┴───────────┴─────────────────────────────┘
//! ```
//!
//! The payload opens with a fixed preamble followed by a type-specific body:
//!
//! ```text
//! ┌─────────┬───────────┬───────────┬──────────────┐
//! │ Type    │ Addr A    │ Addr B    │ Body         │
//! │ 2 bytes │ uint16 LE │ uint16 LE │ type-specific│
//! └─────────┴───────────┴───────────┴──────────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. This module validates only the
//! frame layer (magic, version, lengths); type and address semantics belong
//! to the session.

use bytes::Bytes;

use crate::error::{Result, UcnetError};

use super::message::Message;

/// Fixed magic bytes opening every frame.
pub const MAGIC: [u8; 2] = *b"UC";

/// The one wire protocol version this crate speaks.
pub const PROTOCOL_VERSION: u16 = 1;

/// Frame header size in bytes: magic + version + length.
pub const FRAME_HEADER_SIZE: usize = 6;

/// Payload preamble size in bytes: type tag + address pair.
pub const PAYLOAD_PREAMBLE_SIZE: usize = 6;

/// Hard payload ceiling imposed by the 16-bit length field.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Two-character message type tag.
///
/// Tags the codec does not recognize pass through undisturbed; only the
/// session decides which types produce state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageType(pub [u8; 2]);

impl MessageType {
    /// UDP-port announcement, sent once after connecting.
    pub const UM: MessageType = MessageType(*b"UM");
    /// Subscribe request carrying the client identity document.
    pub const JM: MessageType = MessageType(*b"JM");
    /// Keepalive, empty body.
    pub const KA: MessageType = MessageType(*b"KA");
    /// Single named-parameter value, both device pushes and commands.
    pub const PV: MessageType = MessageType(*b"PV");
    /// Compressed full-state snapshot.
    pub const ZM: MessageType = MessageType(*b"ZM");

    /// The tag as a string, for logging. Non-ASCII tags render lossily.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque routing tag carried by every message.
///
/// The values are fixed per message type by convention of the observed
/// protocol; nothing in this crate interprets them. They are modeled as an
/// explicit codec parameter in case future firmware routes by them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrPair {
    /// First routing value (LE16 on the wire).
    pub a: u16,
    /// Second routing value (LE16 on the wire).
    pub b: u16,
}

impl AddrPair {
    /// Create an address pair.
    pub const fn new(a: u16, b: u16) -> Self {
        Self { a, b }
    }
}

/// Address pair used by the UDP-port announcement (UM).
pub const ADDR_ANNOUNCE: AddrPair = AddrPair::new(0x0065, 0x0066);

/// Address pair shared by all other observed traffic (JM, KA, PV, ZM).
pub const ADDR_CONTROL: AddrPair = AddrPair::new(0x0068, 0x006a);

/// Encode a complete frame from its parts.
///
/// The caller must keep `PAYLOAD_PREAMBLE_SIZE + body.len()` under 65 536;
/// the 16-bit length field cannot describe anything larger.
///
/// # Example
///
/// ```
/// use ucnet_client::protocol::{encode_frame, MessageType, ADDR_CONTROL, FRAME_HEADER_SIZE};
///
/// let bytes = encode_frame(MessageType::KA, ADDR_CONTROL, &[]);
/// assert_eq!(bytes.len(), FRAME_HEADER_SIZE + 6);
/// assert_eq!(&bytes[..2], b"UC");
/// ```
pub fn encode_frame(kind: MessageType, addr: AddrPair, body: &[u8]) -> Vec<u8> {
    let payload_len = PAYLOAD_PREAMBLE_SIZE + body.len();
    debug_assert!(payload_len <= MAX_PAYLOAD_SIZE);

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload_len);
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
    buf.extend_from_slice(&(payload_len as u16).to_le_bytes());
    buf.extend_from_slice(&kind.0);
    buf.extend_from_slice(&addr.a.to_le_bytes());
    buf.extend_from_slice(&addr.b.to_le_bytes());
    buf.extend_from_slice(body);
    buf
}

/// Decode one frame from the front of `bytes`.
///
/// Trailing bytes beyond the declared length are ignored, so a UDP datagram
/// can be handed over whole. Fails with [`UcnetError::MalformedFrame`] when
/// the header is short, the magic or version is wrong, or the buffer does
/// not hold the declared payload.
pub fn decode_frame(bytes: &[u8]) -> Result<Message> {
    if bytes.len() < FRAME_HEADER_SIZE {
        return Err(UcnetError::MalformedFrame(format!(
            "{} bytes is too short for a frame header",
            bytes.len()
        )));
    }
    if bytes[..2] != MAGIC {
        return Err(UcnetError::MalformedFrame(format!(
            "bad magic {:02x}{:02x}",
            bytes[0], bytes[1]
        )));
    }
    let version = u16::from_le_bytes([bytes[2], bytes[3]]);
    if version != PROTOCOL_VERSION {
        return Err(UcnetError::MalformedFrame(format!(
            "unsupported version {version}"
        )));
    }
    let length = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
    let payload = &bytes[FRAME_HEADER_SIZE..];
    if payload.len() < length {
        return Err(UcnetError::MalformedFrame(format!(
            "payload truncated: declared {length}, have {}",
            payload.len()
        )));
    }
    let payload = &payload[..length];
    if payload.len() < PAYLOAD_PREAMBLE_SIZE {
        return Err(UcnetError::MalformedFrame(format!(
            "payload too short for type and address: {length}"
        )));
    }

    let kind = MessageType([payload[0], payload[1]]);
    let addr = AddrPair::new(
        u16::from_le_bytes([payload[2], payload[3]]),
        u16::from_le_bytes([payload[4], payload[5]]),
    );
    let body = Bytes::copy_from_slice(&payload[PAYLOAD_PREAMBLE_SIZE..]);

    Ok(Message::new(kind, addr, body))
}
