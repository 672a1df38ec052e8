//! Error types for ucnet-client.

use thiserror::Error;

/// Main error type for all ucnet operations.
#[derive(Debug, Error)]
pub enum UcnetError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (subscribe document, snapshot tree).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame failed magic/version/length validation. Recovered locally by
    /// resynchronizing the stream; never fatal to the session.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A compressed snapshot body could not be inflated. The snapshot is
    /// dropped without touching cached state.
    #[error("snapshot decompression failed: {0}")]
    Decompression(String),

    /// A command was issued while the control connection is not writable.
    /// The write is a reported no-op; it is never queued or retried.
    #[error("not connected")]
    NotConnected,

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using UcnetError.
pub type Result<T> = std::result::Result<T, UcnetError>;
