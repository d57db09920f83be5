//! Coordination protocol handler
//!
//! Pure adapter between inbound client events and registry operations. Owns
//! no state; the transport details live in [`crate::server`], the semantics
//! in [`crate::registry`].

use tracing::debug;

use crate::messages::{ClientEvent, ServerEvent};
use crate::registry::{PeerChannel, Registry};

/// Apply one client event against the registry.
pub fn handle_event(registry: &Registry, channel: &PeerChannel, event: ClientEvent) {
    match event {
        ClientEvent::CreateRoom { room_id, peer_id } => {
            registry.create_room(&room_id, &peer_id, channel);
        }
        ClientEvent::JoinRoom { room_id, peer_id } => {
            registry.join_room(&room_id, &peer_id, channel);
        }
        ClientEvent::RelayTransferHint {
            room_id,
            payload,
            sender_id,
        } => {
            registry.relay_transfer_hint(&room_id, payload, &sender_id, channel);
        }
        ClientEvent::Leave { peer_id } => {
            registry.leave(&peer_id);
        }
        ClientEvent::RequestNickname { peer_id } => {
            registry.request_nickname(&peer_id, channel);
        }
        ClientEvent::Ping { timestamp } => {
            debug!(timestamp, "ping");
            channel.send(ServerEvent::Pong { timestamp });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChannelId;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_channel() -> (PeerChannel, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PeerChannel::new(ChannelId::generate(), tx), rx)
    }

    #[test]
    fn test_ping_pong() {
        let registry = Registry::new(Duration::from_secs(600));
        let (channel, mut rx) = test_channel();

        handle_event(&registry, &channel, ClientEvent::Ping { timestamp: 42 });

        match rx.try_recv().unwrap() {
            ServerEvent::Pong { timestamp } => assert_eq!(timestamp, 42),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_events_drive_registry() {
        let registry = Registry::new(Duration::from_secs(600));
        let (ch1, mut rx1) = test_channel();
        let (ch2, _rx2) = test_channel();

        handle_event(
            &registry,
            &ch1,
            ClientEvent::CreateRoom {
                room_id: "r".into(),
                peer_id: "p1".into(),
            },
        );
        handle_event(
            &registry,
            &ch2,
            ClientEvent::JoinRoom {
                room_id: "r".into(),
                peer_id: "p2".into(),
            },
        );

        assert_eq!(registry.members("r").unwrap().len(), 2);
        let events: Vec<_> = std::iter::from_fn(|| rx1.try_recv().ok()).collect();
        assert!(matches!(&events[0], ServerEvent::RoomCreated { .. }));

        handle_event(
            &registry,
            &ch1,
            ClientEvent::Leave {
                peer_id: "p1".into(),
            },
        );
        assert_eq!(registry.members("r").unwrap().len(), 1);
    }
}
