//! Coordination protocol messages
//!
//! JSON over the duplex channel, tagged with a `type` field. Event names
//! mirror what the browser client listens for, so the payloads here are the
//! wire format, not an internal representation.

use serde::{Deserialize, Serialize};

/// One room member as reported in membership views
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Application-level peer identity
    pub id: String,
    /// Display name assigned by the coordinator
    pub nickname: String,
}

/// Requests a client sends to the coordinator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Create a room and become its first member
    CreateRoom { room_id: String, peer_id: String },

    /// Join an existing room
    JoinRoom { room_id: String, peer_id: String },

    /// Forward an opaque transfer hint to everyone else in the room
    RelayTransferHint {
        room_id: String,
        payload: serde_json::Value,
        sender_id: String,
    },

    /// Leave every room and drop the peer's identity
    Leave { peer_id: String },

    /// Assign (or repeat) the nickname for a peer id
    RequestNickname { peer_id: String },

    /// Keepalive
    Ping { timestamp: u64 },
}

/// Notifications the coordinator sends to clients
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The requested room was created
    RoomCreated { room_id: String },

    /// The requested room was joined
    RoomJoined { room_id: String },

    /// createRoom failed: the id is already active
    RoomExists { room_id: String },

    /// joinRoom failed: no such active room
    RoomNotFound { room_id: String },

    /// The room was torn down (emptied out or idle too long)
    RoomCleared { room_id: String },

    /// The caller's assigned nickname
    NicknameAssigned { nickname: String },

    /// Full membership snapshot for the caller's room
    AllPeers { peers: Vec<PeerEntry> },

    /// A peer joined the room
    NewPeer { id: String, nickname: String },

    /// A peer left the room
    PeerLeft { id: String, nickname: String },

    /// Opaque transfer hint relayed from another member
    TransferHint {
        payload: serde_json::Value,
        sender_id: String,
    },

    /// Request-level failure
    Error { code: ErrorCode, message: String },

    /// Keepalive response
    Pong { timestamp: u64 },
}

/// Error codes
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Nickname space exhausted (defensive; practically unreachable)
    AllocationExhausted,

    /// Message could not be parsed
    InvalidRequest,

    /// Internal server error
    InternalError,
}

impl ServerEvent {
    /// Create an error event
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ClientEvent {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
