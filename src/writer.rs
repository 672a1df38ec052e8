//! Dedicated writer task for the control connection.
//!
//! All outbound frames — handshake, keepalives, commands — go through one
//! task that owns the TCP write half, fed by an mpsc channel:
//!
//! ```text
//! heartbeat ─┐
//! commands  ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► TCP
//! handshake ─┘
//! ```
//!
//! Single ownership of the write half removes any need for a mutex around
//! the socket. The channel is shallow; this protocol's outbound traffic is
//! a keepalive every couple of seconds plus occasional sub-100-byte command
//! frames, so nothing here batches or tracks backpressure.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, UcnetError};

/// Channel capacity for queued frames.
const CHANNEL_CAPACITY: usize = 64;

/// A fully encoded frame ready to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    bytes: Bytes,
}

impl OutboundFrame {
    /// Wrap encoded frame bytes.
    #[inline]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
        }
    }
}

/// Handle for sending frames to the writer task. Cheap to clone.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// Fails with [`UcnetError::ConnectionClosed`] once the writer task has
    /// exited (write error or session teardown).
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| UcnetError::ConnectionClosed)
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task exits when every handle is dropped or a write fails; dropping
/// the write half closes the connection's send direction.
pub fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Receive frames and write them to the transport in arrival order.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        writer.write_all(&frame.bytes).await?;
        writer.flush().await?;
    }
    Ok(())
}
