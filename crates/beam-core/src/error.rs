//! Error types for the transfer engine

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while sending or reassembling a file
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source file is empty: {0}")]
    EmptySource(PathBuf),

    #[error("peer channel closed mid-transfer")]
    ChannelClosed,

    #[error("end marker for {file_name} with {missing} of {total} chunks missing")]
    ProtocolViolation {
        file_name: String,
        missing: usize,
        total: u32,
    },

    #[error("end marker for unknown transfer {0}")]
    UnexpectedEnd(String),

    #[error("chunk index {index} out of range for {file_name} ({total} chunks)")]
    ChunkOutOfRange {
        file_name: String,
        index: u32,
        total: u32,
    },

    #[error("chunk count for {file_name} changed mid-transfer ({previous} then {claimed})")]
    ChunkCountMismatch {
        file_name: String,
        previous: u32,
        claimed: u32,
    },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

impl From<bincode::Error> for TransferError {
    fn from(e: bincode::Error) -> Self {
        TransferError::Codec(e.to_string())
    }
}
