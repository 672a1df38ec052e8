//! Protocol layer: wire format, message values, reassembly, snapshots.
//!
//! Pure encode/decode lives in [`wire_format`] and [`message`]; neither does
//! any I/O or holds state. [`FrameBuffer`] adds the stream-side state needed
//! to reassemble frames from arbitrary TCP chunks, and [`snapshot`] handles
//! the compressed ZM state tree.

mod frame_buffer;
pub mod message;
mod snapshot;
mod wire_format;

pub use frame_buffer::FrameBuffer;
pub use message::Message;
pub use snapshot::decompress_snapshot;
pub use wire_format::{
    decode_frame, encode_frame, AddrPair, MessageType, ADDR_ANNOUNCE, ADDR_CONTROL,
    FRAME_HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE, PAYLOAD_PREAMBLE_SIZE, PROTOCOL_VERSION,
};
