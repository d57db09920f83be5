//! Wire protocol for the peer-to-peer data channel
//!
//! Messages are serialized with bincode and prefixed with a 4-byte
//! little-endian length. Chunk indices and the total chunk count are carried
//! on every chunk so a receiver can place data without assuming the channel
//! preserves order.

use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::MAX_FRAME_SIZE;

/// Messages exchanged over a peer-to-peer channel during a transfer
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferMessage {
    /// One slice of the file
    Chunk {
        /// Zero-based chunk index
        index: u32,
        /// Total number of chunks in this transfer
        total_chunks: u32,
        /// File this chunk belongs to
        file_name: String,
        /// Raw chunk bytes
        chunk: Vec<u8>,
    },

    /// Terminal marker; the sender has emitted every chunk
    End { file_name: String },
}

impl TransferMessage {
    /// File name this message belongs to
    pub fn file_name(&self) -> &str {
        match self {
            TransferMessage::Chunk { file_name, .. } => file_name,
            TransferMessage::End { file_name } => file_name,
        }
    }
}

/// Serialize a message with length prefix
pub fn encode_frame(msg: &TransferMessage) -> Result<Vec<u8>, TransferError> {
    let payload = bincode::serialize(msg)?;
    let len = payload.len() as u32;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);

    Ok(frame)
}

/// Deserialize a message payload (without length prefix), capped at
/// [`MAX_FRAME_SIZE`]. Deployments running a larger chunk size should use
/// [`decode_frame_limited`] with a matching cap.
pub fn decode_frame(payload: &[u8]) -> Result<TransferMessage, TransferError> {
    decode_frame_limited(payload, MAX_FRAME_SIZE)
}

/// Deserialize a message payload with an explicit size cap
pub fn decode_frame_limited(
    payload: &[u8],
    max: usize,
) -> Result<TransferMessage, TransferError> {
    if payload.len() > max {
        return Err(TransferError::FrameTooLarge {
            size: payload.len(),
            max,
        });
    }
    Ok(bincode::deserialize(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_chunk() {
        let msg = TransferMessage::Chunk {
            index: 2,
            total_chunks: 3,
            file_name: "photo.png".into(),
            chunk: vec![7u8; 1024],
        };

        let frame = encode_frame(&msg).unwrap();
        assert!(frame.len() > 4);

        let len = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4);

        let decoded = decode_frame(&frame[4..]).unwrap();
        match decoded {
            TransferMessage::Chunk {
                index,
                total_chunks,
                file_name,
                chunk,
            } => {
                assert_eq!(index, 2);
                assert_eq!(total_chunks, 3);
                assert_eq!(file_name, "photo.png");
                assert_eq!(chunk.len(), 1024);
            }
            _ => panic!("wrong message type"),
        }
    }

    #[test]
    fn test_roundtrip_end() {
        let msg = TransferMessage::End {
            file_name: "photo.png".into(),
        };

        let frame = encode_frame(&msg).unwrap();
        let decoded = decode_frame(&frame[4..]).unwrap();
        assert!(matches!(decoded, TransferMessage::End { file_name } if file_name == "photo.png"));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let payload = vec![0u8; MAX_FRAME_SIZE + 1];
        let err = decode_frame(&payload).unwrap_err();
        assert!(matches!(err, TransferError::FrameTooLarge { .. }));
    }
}
