//! Beam Coordination Service
//!
//! Lightweight signaling server that lets browser peers find each other
//! before they open a direct data channel. Clients connect over WebSocket,
//! get a human-readable nickname, and create or join named rooms; the server
//! fans membership changes out to everyone in the room. Once two peers have
//! each other's identity from the membership view, file data flows directly
//! between them and the coordinator is out of the loop.
//!
//! # Protocol
//!
//! 1. Client connects and requests a nickname for its peer id
//! 2. Client creates or joins a room by id
//! 3. Server broadcasts the membership view to the room
//! 4. Peers open a direct channel and run the chunked transfer protocol
//! 5. Idle rooms are swept after the inactivity window
//!
//! Everything is in-memory; nothing survives a restart.

pub mod handler;
pub mod messages;
pub mod nickname;
pub mod registry;
pub mod server;

pub use messages::{ClientEvent, ErrorCode, PeerEntry, ServerEvent};
pub use nickname::NicknameAllocator;
pub use registry::{ChannelId, PeerChannel, Registry};
pub use server::SignalServer;
