//! Frame buffer for accumulating partial TCP reads.
//!
//! TCP delivers the control stream in arbitrary chunks, so frames can be
//! split anywhere, and a misbehaving device or transient corruption can put
//! garbage between them. [`FrameBuffer`] turns that stream back into a
//! sequence of decoded messages:
//!
//! - partial frames are carried over in a `bytes::BytesMut` until the rest
//!   arrives;
//! - bytes before the next magic sequence are discarded as noise;
//! - a header with the right magic but wrong version is skipped by exactly
//!   2 bytes, so a legitimate header overlapping the discarded magic can
//!   still be found;
//! - a frame that extracts but fails payload decoding is skipped the same
//!   way — a single corrupt frame never stalls the stream.
//!
//! UDP datagrams bypass this type entirely: one datagram holds one complete
//! frame and goes straight to [`decode_frame`](super::decode_frame).

use bytes::BytesMut;

use super::wire_format::{decode_frame, FRAME_HEADER_SIZE, MAGIC, PROTOCOL_VERSION};
use super::Message;

/// Resynchronization step: past the 2-byte magic, keeping any header that
/// overlaps it findable.
const RESYNC_SKIP: usize = 2;

/// Buffer for accumulating incoming bytes and extracting complete messages.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
}

impl FrameBuffer {
    /// Create an empty frame buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// This is the main API for processing incoming data from the socket.
    /// Fragmented trailing data is buffered for the next push. Garbage and
    /// corrupt frames are consumed silently; the stream resynchronizes on
    /// the next valid magic.
    pub fn push(&mut self, data: &[u8]) -> Vec<Message> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(message) = self.try_extract_one() {
            messages.push(message);
        }
        messages
    }

    /// Try to extract a single message, discarding noise as needed.
    ///
    /// Returns `None` when the buffer holds no complete frame — either it is
    /// waiting for more data or it has been emptied of garbage.
    fn try_extract_one(&mut self) -> Option<Message> {
        while self.buffer.len() >= FRAME_HEADER_SIZE {
            // Align the buffer on the next magic sequence.
            match find_magic(&self.buffer) {
                // No frame can start anywhere in the buffer.
                None => {
                    self.buffer.clear();
                    return None;
                }
                Some(0) => {}
                // Leading noise before a candidate frame.
                Some(offset) => {
                    let _ = self.buffer.split_to(offset);
                    continue;
                }
            }

            let version = u16::from_le_bytes([self.buffer[2], self.buffer[3]]);
            if version != PROTOCOL_VERSION {
                // Not a real header. Skip only the magic; a valid header may
                // begin inside the bytes we just looked at.
                let _ = self.buffer.split_to(RESYNC_SKIP);
                continue;
            }

            let length = u16::from_le_bytes([self.buffer[4], self.buffer[5]]) as usize;
            let total = FRAME_HEADER_SIZE + length;
            if self.buffer.len() < total {
                // Wait for the rest of the payload.
                return None;
            }

            match decode_frame(&self.buffer[..total]) {
                Ok(message) => {
                    let _ = self.buffer.split_to(total);
                    return Some(message);
                }
                Err(_) => {
                    // Header looked plausible but the payload did not decode.
                    let _ = self.buffer.split_to(RESYNC_SKIP);
                }
            }
        }
        None
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the offset of the next magic sequence, if any.
fn find_magic(buffer: &[u8]) -> Option<usize> {
    buffer.windows(MAGIC.len()).position(|window| window == MAGIC)
}
