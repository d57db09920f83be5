//! Room and peer registry
//!
//! Owns every piece of coordination state: active rooms, peer records,
//! nickname ownership, and the channel index used to resolve transport-level
//! disconnects. All of it sits behind one lock, so each operation — the idle
//! sweep included — is serialized and can never observe a half-applied
//! transition. Notifications are enqueued onto member channels while the
//! lock is held, which keeps each observer's event stream in operation order.
//!
//! Rooms are either active (at least one member) or gone; the last member
//! leaving deletes the room synchronously, and the sweep deletes rooms whose
//! activity clock has run past the inactivity window.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::messages::{ErrorCode, PeerEntry, ServerEvent};
use crate::nickname::NicknameAllocator;

/// Transport-connection identity, distinct from the application peer id
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        getrandom::fill(&mut bytes).expect("RNG failed");
        Self(u64::from_le_bytes(bytes))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.to_le_bytes()))
    }
}

/// Write half of one client's duplex channel, as the registry sees it.
///
/// The registry only ever enqueues; the server's writer task turns queued
/// events into socket frames. A send onto a closed queue is dropped silently:
/// the disconnect for that channel is already in flight.
#[derive(Clone)]
pub struct PeerChannel {
    id: ChannelId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl PeerChannel {
    pub fn new(id: ChannelId, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn send(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }
}

struct Member {
    channel: PeerChannel,
    nickname: String,
}

struct Room {
    members: HashMap<String, Member>,
    last_activity: Instant,
}

impl Room {
    fn entries(&self) -> Vec<PeerEntry> {
        self.members
            .iter()
            .map(|(id, member)| PeerEntry {
                id: id.clone(),
                nickname: member.nickname.clone(),
            })
            .collect()
    }
}

struct PeerRecord {
    nickname: String,
    rooms: HashSet<String>,
    channel: PeerChannel,
}

#[derive(Default)]
struct RegistryInner {
    rooms: HashMap<String, Room>,
    peers: HashMap<String, PeerRecord>,
    /// Channel identity -> peer id, so a transport closure resolves without
    /// scanning rooms
    by_channel: HashMap<ChannelId, String>,
}

/// The coordination service's single source of truth
pub struct Registry {
    inner: Mutex<RegistryInner>,
    names: NicknameAllocator,
    idle_window: Duration,
}

impl Registry {
    pub fn new(idle_window: Duration) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            names: NicknameAllocator::new(),
            idle_window,
        }
    }

    /// Create a room with the caller as its first member.
    ///
    /// Fails with `roomExists` (and touches nothing) if the id is already
    /// active. On success the caller gets `roomCreated`, its nickname, and
    /// the membership snapshot.
    pub fn create_room(&self, room_id: &str, peer_id: &str, channel: &PeerChannel) {
        let mut inner = self.inner.lock();

        if inner.rooms.contains_key(room_id) {
            debug!(room = room_id, peer = peer_id, "create rejected, room already active");
            channel.send(ServerEvent::RoomExists {
                room_id: room_id.to_string(),
            });
            return;
        }

        let nickname = match self.ensure_peer(&mut inner, peer_id, channel) {
            Ok(nickname) => nickname,
            Err(event) => {
                channel.send(event);
                return;
            }
        };

        let mut room = Room {
            members: HashMap::new(),
            last_activity: Instant::now(),
        };
        room.members.insert(
            peer_id.to_string(),
            Member {
                channel: channel.clone(),
                nickname: nickname.clone(),
            },
        );
        let entries = room.entries();
        inner.rooms.insert(room_id.to_string(), room);
        if let Some(record) = inner.peers.get_mut(peer_id) {
            record.rooms.insert(room_id.to_string());
        }

        info!(room = room_id, peer = peer_id, "room created");
        channel.send(ServerEvent::RoomCreated {
            room_id: room_id.to_string(),
        });
        channel.send(ServerEvent::NicknameAssigned { nickname });
        channel.send(ServerEvent::AllPeers { peers: entries });
    }

    /// Join an active room.
    ///
    /// Fails with `roomNotFound` if the id is not active. Existing members
    /// hear `newPeer`, everyone gets a fresh `allPeers`, the joiner gets
    /// `roomJoined` plus its nickname.
    pub fn join_room(&self, room_id: &str, peer_id: &str, channel: &PeerChannel) {
        let mut inner = self.inner.lock();

        if !inner.rooms.contains_key(room_id) {
            debug!(room = room_id, peer = peer_id, "join rejected, no such room");
            channel.send(ServerEvent::RoomNotFound {
                room_id: room_id.to_string(),
            });
            return;
        }

        let nickname = match self.ensure_peer(&mut inner, peer_id, channel) {
            Ok(nickname) => nickname,
            Err(event) => {
                channel.send(event);
                return;
            }
        };

        let Some(room) = inner.rooms.get_mut(room_id) else {
            return;
        };

        for member in room.members.values() {
            member.channel.send(ServerEvent::NewPeer {
                id: peer_id.to_string(),
                nickname: nickname.clone(),
            });
        }

        room.members.insert(
            peer_id.to_string(),
            Member {
                channel: channel.clone(),
                nickname: nickname.clone(),
            },
        );
        room.last_activity = Instant::now();

        let entries = room.entries();
        for member in room.members.values() {
            member.channel.send(ServerEvent::AllPeers {
                peers: entries.clone(),
            });
        }

        channel.send(ServerEvent::RoomJoined {
            room_id: room_id.to_string(),
        });
        channel.send(ServerEvent::NicknameAssigned { nickname });

        if let Some(record) = inner.peers.get_mut(peer_id) {
            record.rooms.insert(room_id.to_string());
        }

        info!(room = room_id, peer = peer_id, "peer joined room");
    }

    /// Explicit departure: remove the peer from every room it is in and
    /// destroy its record, releasing the nickname.
    pub fn leave(&self, peer_id: &str) {
        let mut inner = self.inner.lock();
        self.remove_peer_everywhere(&mut inner, peer_id);
    }

    /// Transport closure: same teardown as [`leave`](Self::leave), located
    /// via the channel index since the transport does not carry the peer id.
    pub fn disconnect(&self, channel_id: ChannelId) {
        let mut inner = self.inner.lock();
        let Some(peer_id) = inner.by_channel.get(&channel_id).cloned() else {
            debug!(channel = %channel_id, "disconnect for unregistered channel");
            return;
        };
        info!(peer = %peer_id, channel = %channel_id, "channel closed");
        self.remove_peer_everywhere(&mut inner, &peer_id);
    }

    /// Forward an opaque transfer hint to every other member of the room and
    /// reset its activity clock. A hint for a room that is no longer active
    /// earns the sender a `roomCleared`.
    pub fn relay_transfer_hint(
        &self,
        room_id: &str,
        payload: serde_json::Value,
        sender_id: &str,
        channel: &PeerChannel,
    ) {
        let mut inner = self.inner.lock();

        let Some(room) = inner.rooms.get_mut(room_id) else {
            debug!(room = room_id, sender = sender_id, "relay to inactive room");
            channel.send(ServerEvent::RoomCleared {
                room_id: room_id.to_string(),
            });
            return;
        };

        room.last_activity = Instant::now();
        for (id, member) in &room.members {
            if id != sender_id {
                member.channel.send(ServerEvent::TransferHint {
                    payload: payload.clone(),
                    sender_id: sender_id.to_string(),
                });
            }
        }
        debug!(room = room_id, sender = sender_id, "transfer hint relayed");
    }

    /// Assign (or repeat) the nickname for a peer id.
    pub fn request_nickname(&self, peer_id: &str, channel: &PeerChannel) {
        let mut inner = self.inner.lock();
        match self.ensure_peer(&mut inner, peer_id, channel) {
            Ok(nickname) => channel.send(ServerEvent::NicknameAssigned { nickname }),
            Err(event) => channel.send(event),
        }
    }

    /// Sweep callback: delete every room idle past the window, telling any
    /// lingering member `roomCleared`. Lingering members keep their peer
    /// records; only departure or disconnection destroys those.
    pub fn expire_idle(&self) -> Vec<String> {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        let expired: Vec<String> = inner
            .rooms
            .iter()
            .filter(|(_, room)| now.duration_since(room.last_activity) >= self.idle_window)
            .map(|(id, _)| id.clone())
            .collect();

        for room_id in &expired {
            let Some(room) = inner.rooms.remove(room_id) else {
                continue;
            };
            for (peer_id, member) in &room.members {
                member.channel.send(ServerEvent::RoomCleared {
                    room_id: room_id.clone(),
                });
                if let Some(record) = inner.peers.get_mut(peer_id) {
                    record.rooms.remove(room_id);
                }
            }
            info!(room = %room_id, lingering = room.members.len(), "room cleared due to inactivity");
        }

        expired
    }

    /// Number of active rooms (for monitoring)
    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    /// Number of live peer records (for monitoring)
    pub fn peer_count(&self) -> usize {
        self.inner.lock().peers.len()
    }

    pub fn is_active(&self, room_id: &str) -> bool {
        self.inner.lock().rooms.contains_key(room_id)
    }

    /// Membership snapshot of an active room
    pub fn members(&self, room_id: &str) -> Option<Vec<PeerEntry>> {
        self.inner.lock().rooms.get(room_id).map(Room::entries)
    }

    pub fn nickname_of(&self, peer_id: &str) -> Option<String> {
        self.inner
            .lock()
            .peers
            .get(peer_id)
            .map(|record| record.nickname.clone())
    }

    /// Look up (or create) the peer record, handing back its nickname.
    ///
    /// A known peer id arriving on a fresh channel rebinds the record and
    /// every room membership to the new channel.
    fn ensure_peer(
        &self,
        inner: &mut RegistryInner,
        peer_id: &str,
        channel: &PeerChannel,
    ) -> Result<String, ServerEvent> {
        if let Some(record) = inner.peers.get_mut(peer_id) {
            if record.channel.id() != channel.id() {
                inner.by_channel.remove(&record.channel.id());
                inner.by_channel.insert(channel.id(), peer_id.to_string());
                record.channel = channel.clone();
                for room_id in &record.rooms {
                    if let Some(room) = inner.rooms.get_mut(room_id) {
                        if let Some(member) = room.members.get_mut(peer_id) {
                            member.channel = channel.clone();
                        }
                    }
                }
                debug!(peer = peer_id, channel = %channel.id(), "peer rebound to new channel");
            }
            return Ok(record.nickname.clone());
        }

        let nickname = match self.names.allocate() {
            Ok(nickname) => nickname,
            Err(e) => {
                return Err(ServerEvent::error(
                    ErrorCode::AllocationExhausted,
                    e.to_string(),
                ))
            }
        };
        inner.peers.insert(
            peer_id.to_string(),
            PeerRecord {
                nickname: nickname.clone(),
                rooms: HashSet::new(),
                channel: channel.clone(),
            },
        );
        inner.by_channel.insert(channel.id(), peer_id.to_string());
        info!(peer = peer_id, nickname = %nickname, "peer registered");
        Ok(nickname)
    }

    fn remove_peer_everywhere(&self, inner: &mut RegistryInner, peer_id: &str) {
        let Some(record) = inner.peers.remove(peer_id) else {
            return;
        };
        inner.by_channel.remove(&record.channel.id());

        for room_id in &record.rooms {
            let emptied = match inner.rooms.get_mut(room_id) {
                Some(room) => {
                    let Some(member) = room.members.remove(peer_id) else {
                        continue;
                    };
                    if room.members.is_empty() {
                        true
                    } else {
                        room.last_activity = Instant::now();
                        let entries = room.entries();
                        for m in room.members.values() {
                            m.channel.send(ServerEvent::PeerLeft {
                                id: peer_id.to_string(),
                                nickname: member.nickname.clone(),
                            });
                            m.channel.send(ServerEvent::AllPeers {
                                peers: entries.clone(),
                            });
                        }
                        false
                    }
                }
                None => continue,
            };
            if emptied {
                inner.rooms.remove(room_id);
                debug!(room = %room_id, "room removed (empty)");
            }
            info!(room = %room_id, peer = peer_id, "peer left room");
        }

        self.names.release(&record.nickname);
        info!(peer = peer_id, nickname = %record.nickname, "peer departed, nickname released");
    }
}
