//! Integration tests for ucnet-client.
//!
//! The codec tests compose the frame builders with the reassembler and the
//! state store; the session tests drive a real [`Session`] against a fake
//! device listening on loopback TCP/UDP.

use std::collections::VecDeque;
use std::io::Write as _;
use std::time::Duration;

use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use ucnet_client::protocol::{
    encode_frame, message, FrameBuffer, Message, MessageType, ADDR_CONTROL,
};
use ucnet_client::{ChannelAttr, ConnectionStatus, Flag, Session, SessionConfig, StateStore};

const WAIT: Duration = Duration::from_secs(2);

/// Build a wire-complete ZM frame around a JSON tree.
fn snapshot_frame(tree: &serde_json::Value) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(tree.to_string().as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut body = Vec::new();
    body.extend_from_slice(&[0u8; 4]);
    body.extend_from_slice(&[0u8; 2]);
    body.extend_from_slice(&compressed);
    encode_frame(MessageType::ZM, ADDR_CONTROL, &body)
}

/// The device side of a session under test.
struct DeviceLink {
    stream: TcpStream,
    frames: FrameBuffer,
    pending: VecDeque<Message>,
}

impl DeviceLink {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            frames: FrameBuffer::new(),
            pending: VecDeque::new(),
        }
    }

    async fn next_message(&mut self) -> Message {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return message;
            }
            let mut buf = vec![0u8; 4096];
            let n = self.stream.read(&mut buf).await.expect("device read");
            assert!(n > 0, "unexpected EOF from client");
            self.pending.extend(self.frames.push(&buf[..n]));
        }
    }

    /// Next message of the given kind, skipping keepalives and the rest.
    async fn next_of_kind(&mut self, kind: MessageType) -> Message {
        tokio::time::timeout(WAIT, async {
            loop {
                let message = self.next_message().await;
                if message.kind() == kind {
                    return message;
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
    }

    async fn send(&mut self, frame: &[u8]) {
        self.stream.write_all(frame).await.expect("device write");
    }
}

/// Start a fake device and a connected session pointed at it.
async fn connected_pair() -> (Session, DeviceLink) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut session = Session::new(
        SessionConfig::new("127.0.0.1")
            .with_port(port)
            .with_heartbeat_period(Duration::from_millis(50))
            .with_client_name("test-harness"),
    );

    let (accepted, connected) = tokio::join!(listener.accept(), session.connect());
    let (stream, _) = accepted.unwrap();
    connected.unwrap();

    (session, DeviceLink::new(stream))
}

/// Poll until a condition holds or a deadline passes.
async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// The full PV path: an inbound device push decoded off the stream flips
/// the mirror, and the mirror then drives the next toggle's direction.
#[test]
fn test_pv_delta_flows_into_state_store() {
    let mut buffer = FrameBuffer::new();
    let mut store = StateStore::new();

    let pushed = message::parameter_value("line/ch5/mute", 1.0);
    for decoded in buffer.push(&pushed) {
        let (name, value) = decoded.parameter_value().unwrap();
        let path = ucnet_client::ParamPath::parse(&name).unwrap();
        store.apply_delta(path, value);
    }

    assert_eq!(store.channel_flag(5, ChannelAttr::Mute), Flag::Active);

    // A toggle from this state negates: the frame it would send carries 0.0.
    let target = !store.channel_flag(5, ChannelAttr::Mute).is_active();
    let frame = message::parameter_value("line/ch5/mute", message::bool_value(target));
    let decoded = FrameBuffer::new().push(&frame);
    assert_eq!(decoded[0].parameter_value().unwrap().1, 0.0);
}

/// Every client-originated message survives the encode → reassemble →
/// decode cycle with type, address pair and body intact, whole or chunked.
#[test]
fn test_roundtrip_through_reassembler_with_chunking() {
    let mut stream = Vec::new();
    stream.extend_from_slice(&message::announce_udp_port(50000));
    stream.extend_from_slice(&message::subscribe("test-harness").unwrap());
    stream.extend_from_slice(&message::keep_alive());
    stream.extend_from_slice(&message::parameter_value("line/ch7/48v", 0.0));

    let whole = FrameBuffer::new().push(&stream);
    assert_eq!(whole.len(), 4);

    for chunk_size in [1, 3, 7, 64] {
        let mut buffer = FrameBuffer::new();
        let mut messages = Vec::new();
        for chunk in stream.chunks(chunk_size) {
            messages.extend(buffer.push(chunk));
        }

        assert_eq!(messages.len(), whole.len(), "chunk size {chunk_size}");
        for (a, b) in messages.iter().zip(&whole) {
            assert_eq!(a.kind(), b.kind());
            assert_eq!(a.addr(), b.addr());
            assert_eq!(a.body(), b.body());
        }
    }
}

#[tokio::test]
async fn test_handshake_then_heartbeat() {
    let (session, mut device) = connected_pair().await;

    // UM first, announcing the session's bound UDP port.
    let um = device.next_of_kind(MessageType::UM).await;
    let announced = u16::from_le_bytes([um.body()[0], um.body()[1]]);
    assert_eq!(Some(announced), session.udp_port());

    // JM next, carrying the subscribe document behind an LE32 length.
    let jm = device.next_of_kind(MessageType::JM).await;
    let body = jm.body();
    let declared = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
    assert_eq!(declared, body.len() - 4);
    let document: serde_json::Value = serde_json::from_slice(&body[4..]).unwrap();
    assert_eq!(document["id"], "Subscribe");
    assert_eq!(document["clientName"], "test-harness");

    // Keepalives follow on the configured period.
    let ka = device.next_of_kind(MessageType::KA).await;
    assert!(ka.body().is_empty());
    device.next_of_kind(MessageType::KA).await;
}

#[tokio::test]
async fn test_snapshot_and_delta_dispatch() {
    let (session, mut device) = connected_pair().await;

    device
        .send(&snapshot_frame(&json!({
            "children": {
                "global": { "values": { "mixerBypass": 1 } },
                "line": {
                    "children": {
                        "ch3": { "values": { "mute": 1, "solo": 0 } }
                    }
                }
            }
        })))
        .await;

    wait_for(|| session.mixer_bypass() == Flag::Active).await;
    assert_eq!(session.channel_flag(3, ChannelAttr::Mute), Flag::Active);
    assert_eq!(session.channel_flag(3, ChannelAttr::Solo), Flag::Inactive);
    assert_eq!(session.channel_flag(3, ChannelAttr::Hpf), Flag::Unknown);

    // A delta for one parameter leaves the rest of the mirror alone.
    device
        .send(&message::parameter_value("line/ch3/mute", 0.0))
        .await;
    wait_for(|| session.channel_flag(3, ChannelAttr::Mute) == Flag::Inactive).await;
    assert_eq!(session.channel_flag(3, ChannelAttr::Solo), Flag::Inactive);

    // Unknown parameter paths are ignored without complaint.
    device
        .send(&message::parameter_value("line/ch3/gain", 0.5))
        .await;
    device
        .send(&message::parameter_value("line/ch3/solo", 1.0))
        .await;
    wait_for(|| session.channel_flag(3, ChannelAttr::Solo) == Flag::Active).await;

    // A corrupt snapshot is dropped without touching state.
    let mut corrupt = snapshot_frame(&json!({"children": {}}));
    let len = corrupt.len();
    corrupt.truncate(len - 3);
    // Re-declare the shortened payload so the frame still extracts.
    let payload_len = (corrupt.len() - 6) as u16;
    corrupt[4..6].copy_from_slice(&payload_len.to_le_bytes());
    device.send(&corrupt).await;
    device
        .send(&message::parameter_value("global/mixerBypass", 0.0))
        .await;
    wait_for(|| session.mixer_bypass() == Flag::Inactive).await;
    assert_eq!(session.channel_flag(3, ChannelAttr::Solo), Flag::Active);
}

#[tokio::test]
async fn test_toggle_commands() {
    let (session, mut device) = connected_pair().await;

    // Unknown mute toggles to active and records the optimistic value.
    let sent = session.toggle_channel(9, ChannelAttr::Mute).await.unwrap();
    assert!(sent);
    let pv = device.next_of_kind(MessageType::PV).await;
    let (name, value) = pv.parameter_value().unwrap();
    assert_eq!(name, "line/ch9/mute");
    assert_eq!(value, 1.0);
    assert_eq!(session.channel_flag(9, ChannelAttr::Mute), Flag::Active);

    // Unknown 48V toggles to inactive.
    let sent = session
        .toggle_channel(9, ChannelAttr::Phantom)
        .await
        .unwrap();
    assert!(!sent);
    let pv = device.next_of_kind(MessageType::PV).await;
    let (name, value) = pv.parameter_value().unwrap();
    assert_eq!(name, "line/ch9/48v");
    assert_eq!(value, 0.0);
    assert_eq!(session.channel_flag(9, ChannelAttr::Phantom), Flag::Inactive);

    // A device push then drives the next toggle's direction.
    device
        .send(&message::parameter_value("line/ch5/mute", 1.0))
        .await;
    wait_for(|| session.channel_flag(5, ChannelAttr::Mute) == Flag::Active).await;

    let sent = session.toggle_channel(5, ChannelAttr::Mute).await.unwrap();
    assert!(!sent);
    let pv = device.next_of_kind(MessageType::PV).await;
    let (name, value) = pv.parameter_value().unwrap();
    assert_eq!(name, "line/ch5/mute");
    assert_eq!(value, 0.0);

    // Global bypass starts from assumed-inactive.
    let sent = session.toggle_mixer_bypass().await.unwrap();
    assert!(sent);
    let pv = device.next_of_kind(MessageType::PV).await;
    assert_eq!(pv.parameter_value().unwrap().0, "global/mixerBypass");
    assert_eq!(session.mixer_bypass(), Flag::Active);

    // Explicit set commands land as-is.
    session.set_channel(5, ChannelAttr::Hpf, true).await.unwrap();
    let pv = device.next_of_kind(MessageType::PV).await;
    let (name, value) = pv.parameter_value().unwrap();
    assert_eq!(name, "line/ch5/hpf");
    assert_eq!(value, 1.0);
}

#[tokio::test]
async fn test_udp_side_channel() {
    let (session, _device) = connected_pair().await;
    let port = session.udp_port().unwrap();

    let sender = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();

    // A malformed datagram is ignored without killing the loop.
    sender
        .send_to(&[0xBA, 0xD0, 0xBA, 0xD0], ("127.0.0.1", port))
        .await
        .unwrap();

    // One datagram, one frame, no reassembly.
    sender
        .send_to(
            &message::parameter_value("line/ch2/pad", 1.0),
            ("127.0.0.1", port),
        )
        .await
        .unwrap();

    wait_for(|| session.channel_flag(2, ChannelAttr::Pad) == Flag::Active).await;
}

#[tokio::test]
async fn test_disconnect_is_terminal_until_reconnect() {
    let (session, device) = connected_pair().await;
    let mut status = session.watch_status();

    drop(device);

    wait_for(|| session.status() == ConnectionStatus::Disconnected).await;
    assert_eq!(*status.borrow_and_update(), ConnectionStatus::Disconnected);

    // Writes while disconnected are reported no-ops, never queued.
    let result = session.set_channel(1, ChannelAttr::Mute, true).await;
    assert!(matches!(
        result,
        Err(ucnet_client::UcnetError::NotConnected)
    ));
    assert_eq!(session.channel_flag(1, ChannelAttr::Mute), Flag::Unknown);
}

#[tokio::test]
async fn test_reconfigure_tears_down_and_reconnects() {
    let (mut session, mut device) = connected_pair().await;
    device.next_of_kind(MessageType::JM).await;

    // Stand in a second fake device on the same control port; reconfigure
    // keeps the configured port and only moves the host.
    let port = device.stream.local_addr().unwrap().port();
    let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();

    let (accepted, reconnected) =
        tokio::join!(listener.accept(), session.reconfigure("127.0.0.1"));
    let (stream, _) = accepted.unwrap();
    reconnected.unwrap();
    assert_eq!(session.status(), ConnectionStatus::Connected);

    // The old transports are gone: the first device drains to EOF.
    tokio::time::timeout(WAIT, async {
        let mut probe = [0u8; 64];
        loop {
            match device.stream.read(&mut probe).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    })
    .await
    .expect("old connection not closed");

    // A fresh handshake runs against the new device, with a new UDP bind.
    let mut device = DeviceLink::new(stream);
    let um = device.next_of_kind(MessageType::UM).await;
    let announced = u16::from_le_bytes([um.body()[0], um.body()[1]]);
    assert_eq!(Some(announced), session.udp_port());
    device.next_of_kind(MessageType::JM).await;
}
