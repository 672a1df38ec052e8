//! # ucnet-client
//!
//! Rust client for the UCNet audio-mixer control protocol.
//!
//! The device speaks a length-prefixed binary frame format over a
//! persistent TCP control channel (port 49162) plus an ephemeral UDP side
//! channel. This crate implements the client side: the frame codec, stream
//! reassembly with resynchronization, the connect → subscribe → heartbeat
//! lifecycle, decompression of full-state snapshots, and a locally cached
//! mirror of device state that commands read and optimistically mutate.
//!
//! ## Architecture
//!
//! - [`protocol`] — pure frame/message codec, reassembly, snapshots
//! - [`state`] — the tri-state mirror of channel and global flags
//! - [`session`] — transports, handshake, heartbeat, and the command API
//!
//! ## Example
//!
//! ```ignore
//! use ucnet_client::{ChannelAttr, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::new(SessionConfig::new("192.168.1.40"));
//!     session.connect().await?;
//!
//!     session.set_channel(12, ChannelAttr::Mute, true).await?;
//!     let sent = session.toggle_channel(12, ChannelAttr::Solo).await?;
//!     println!("solo is now {sent}");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod session;
pub mod state;

mod writer;

pub use error::UcnetError;
pub use session::{ConnectionStatus, Session, SessionConfig};
pub use state::{ChannelAttr, Flag, ParamPath, StateStore};
