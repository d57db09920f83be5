//! Beam Core - Shared configuration and the chunked file transfer engine
//!
//! This crate contains everything both ends of a transfer need: the wire
//! protocol for the peer-to-peer data channel, the sender-side splitter and
//! the receiver-side reassembler. It knows nothing about the signaling
//! service or about how the data channel itself is established.

pub mod config;
pub mod error;
pub mod protocol;
pub mod receiver;
pub mod sender;

pub use config::{Config, SignalConfig, TransferConfig};
pub use error::TransferError;
pub use protocol::TransferMessage;
pub use receiver::{Inbound, InboundEvent, ReceivedFile};
pub use sender::{send_file, send_file_to_all, PeerLink, SendOptions, SendProgress};

/// Default chunk size in bytes (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Maximum framed message size accepted by the decoder.
///
/// A chunk message is the chunk payload plus a small envelope, so anything
/// far beyond the chunk size is a malformed or hostile frame.
pub const MAX_FRAME_SIZE: usize = DEFAULT_CHUNK_SIZE + 4096;
