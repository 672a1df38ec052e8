//! Message values and typed body builders.
//!
//! A [`Message`] is the decoded content of one frame's payload: the type
//! tag, the opaque address pair, and the type-specific body bytes. The
//! builders in this module produce complete frame byte vectors ready to
//! write to a transport, one per message the client originates:
//!
//! - [`announce_udp_port`] — UM, body is the LE16 local UDP port
//! - [`subscribe`] — JM, body is an LE32 length plus the JSON identity document
//! - [`keep_alive`] — KA, empty body
//! - [`parameter_value`] — PV, body is the parameter name, padding, LE f32
//!
//! Parameter values are 32-bit floats on the wire but booleans at the
//! application level; [`bool_value`] and [`value_is_active`] apply the
//! `value > 0` mapping identically on encode and decode.

use bytes::Bytes;
use serde::Serialize;

use crate::error::{Result, UcnetError};

use super::wire_format::{encode_frame, AddrPair, MessageType, ADDR_ANNOUNCE, ADDR_CONTROL};

/// Byte count reserved for the float at the tail of a PV body.
const PV_VALUE_SIZE: usize = 4;

/// Zero padding between a PV name and its value.
const PV_PADDING: [u8; 3] = [0; 3];

/// Fixed `clientEncoding` field of the subscribe document.
const SUBSCRIBE_ENCODING: u32 = 23106;

/// A decoded protocol message.
#[derive(Debug, Clone)]
pub struct Message {
    kind: MessageType,
    addr: AddrPair,
    body: Bytes,
}

impl Message {
    /// Create a message from decoded parts.
    pub fn new(kind: MessageType, addr: AddrPair, body: Bytes) -> Self {
        Self { kind, addr, body }
    }

    /// The two-character type tag.
    #[inline]
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// The opaque routing tag.
    #[inline]
    pub fn addr(&self) -> AddrPair {
        self.addr
    }

    /// The type-specific body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decode this message's body as a PV parameter push.
    ///
    /// The name is not length-prefixed or NUL-terminated on the wire, so the
    /// decoder must reserve exactly the trailing 4 bytes for the float and
    /// treat everything before them as name bytes, stripping embedded NULs
    /// (the padding the encoder inserts, plus any stray ones).
    pub fn parameter_value(&self) -> Result<(String, f32)> {
        if self.body.len() < PV_VALUE_SIZE {
            return Err(UcnetError::MalformedFrame(format!(
                "PV body of {} bytes has no room for a value",
                self.body.len()
            )));
        }
        let (name, tail) = self.body.split_at(self.body.len() - PV_VALUE_SIZE);
        let value = f32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
        let name: Vec<u8> = name.iter().copied().filter(|&b| b != 0).collect();
        Ok((String::from_utf8_lossy(&name).into_owned(), value))
    }
}

/// Client identity document carried by the subscribe request.
///
/// Everything but the client name is fixed; the device only echoes these
/// fields back in diagnostics.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeRequest<'a> {
    id: &'static str,
    client_name: &'a str,
    client_type: &'static str,
    client_identifier: &'a str,
    client_encoding: u32,
}

/// Build a UM frame announcing the locally bound UDP port.
pub fn announce_udp_port(port: u16) -> Vec<u8> {
    encode_frame(MessageType::UM, ADDR_ANNOUNCE, &port.to_le_bytes())
}

/// Build a JM subscribe frame.
///
/// The body is the LE32 byte length of the JSON document followed by the
/// document itself.
pub fn subscribe(client_name: &str) -> Result<Vec<u8>> {
    let document = serde_json::to_vec(&SubscribeRequest {
        id: "Subscribe",
        client_name,
        client_type: "ControlSurface",
        client_identifier: client_name,
        client_encoding: SUBSCRIBE_ENCODING,
    })?;

    let mut body = Vec::with_capacity(4 + document.len());
    body.extend_from_slice(&(document.len() as u32).to_le_bytes());
    body.extend_from_slice(&document);
    Ok(encode_frame(MessageType::JM, ADDR_CONTROL, &body))
}

/// Build an empty KA keepalive frame.
pub fn keep_alive() -> Vec<u8> {
    encode_frame(MessageType::KA, ADDR_CONTROL, &[])
}

/// Build a PV frame setting one named parameter.
pub fn parameter_value(name: &str, value: f32) -> Vec<u8> {
    let mut body = Vec::with_capacity(name.len() + PV_PADDING.len() + PV_VALUE_SIZE);
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(&PV_PADDING);
    body.extend_from_slice(&value.to_le_bytes());
    encode_frame(MessageType::PV, ADDR_CONTROL, &body)
}

/// Wire encoding of a boolean parameter value.
#[inline]
pub fn bool_value(active: bool) -> f32 {
    if active {
        1.0
    } else {
        0.0
    }
}

/// Application-level reading of a wire parameter value.
#[inline]
pub fn value_is_active(value: f32) -> bool {
    value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_frame;

    #[test]
    fn test_announce_udp_port_roundtrip() {
        let message = decode_frame(&announce_udp_port(53107)).unwrap();

        assert_eq!(message.kind(), MessageType::UM);
        assert_eq!(message.addr(), ADDR_ANNOUNCE);
        assert_eq!(message.body(), 53107u16.to_le_bytes());
    }

    #[test]
    fn test_subscribe_shape() {
        let message = decode_frame(&subscribe("ucnet-client").unwrap()).unwrap();

        assert_eq!(message.kind(), MessageType::JM);
        assert_eq!(message.addr(), ADDR_CONTROL);

        let body = message.body();
        let declared = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
        assert_eq!(declared, body.len() - 4);

        let document: serde_json::Value = serde_json::from_slice(&body[4..]).unwrap();
        assert_eq!(document["id"], "Subscribe");
        assert_eq!(document["clientName"], "ucnet-client");
        assert_eq!(document["clientEncoding"], SUBSCRIBE_ENCODING);
    }

    #[test]
    fn test_keep_alive_is_empty() {
        let message = decode_frame(&keep_alive()).unwrap();

        assert_eq!(message.kind(), MessageType::KA);
        assert_eq!(message.addr(), ADDR_CONTROL);
        assert!(message.body().is_empty());
    }

    #[test]
    fn test_parameter_value_roundtrip() {
        let message = decode_frame(&parameter_value("line/ch12/mute", 1.0)).unwrap();

        assert_eq!(message.kind(), MessageType::PV);
        let (name, value) = message.parameter_value().unwrap();
        assert_eq!(name, "line/ch12/mute");
        assert_eq!(value, 1.0);
    }

    #[test]
    fn test_parameter_value_layout() {
        let message = decode_frame(&parameter_value("a/b", 0.0)).unwrap();
        let body = message.body();

        // name, 3 padding bytes, 4 value bytes
        assert_eq!(&body[..3], b"a/b");
        assert_eq!(&body[3..6], &[0, 0, 0]);
        assert_eq!(&body[6..], &0.0f32.to_le_bytes());
    }

    #[test]
    fn test_parameter_value_strips_embedded_nuls() {
        // Stray NULs inside the name portion must not leak into the decoded
        // name or shift the value window off the trailing 4 bytes.
        let mut body = Vec::new();
        body.extend_from_slice(b"line/\x00ch3\x00/solo");
        body.extend_from_slice(&[0, 0, 0]);
        body.extend_from_slice(&1.0f32.to_le_bytes());

        let message = Message::new(MessageType::PV, ADDR_CONTROL, Bytes::from(body));
        let (name, value) = message.parameter_value().unwrap();

        assert_eq!(name, "line/ch3/solo");
        assert_eq!(value, 1.0);
    }

    #[test]
    fn test_parameter_value_too_short() {
        let message = Message::new(MessageType::PV, ADDR_CONTROL, Bytes::from_static(&[0, 0]));
        assert!(matches!(
            message.parameter_value(),
            Err(UcnetError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_bool_mapping_is_consistent() {
        assert_eq!(bool_value(true), 1.0);
        assert_eq!(bool_value(false), 0.0);
        assert!(value_is_active(bool_value(true)));
        assert!(!value_is_active(bool_value(false)));
        // Any positive value reads as active, zero and below do not.
        assert!(value_is_active(0.5));
        assert!(!value_is_active(0.0));
        assert!(!value_is_active(-1.0));
    }
}
