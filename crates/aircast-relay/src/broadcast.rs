//! Presence broadcasting — tells everyone else who joined or left.

use crate::registry::ClientRegistry;
use aircast_common::{ClientRole, PresenceEvent, ServerMessage};
use uuid::Uuid;

#[derive(Clone)]
pub struct PresenceBroadcaster {
    registry: ClientRegistry,
}

impl PresenceBroadcaster {
    pub fn new(registry: ClientRegistry) -> Self {
        Self { registry }
    }

    /// Announce a new registration to every other registered connection.
    pub async fn announce_connect(&self, id: Uuid, role: ClientRole) {
        self.fan_out(id, PresenceEvent::Connected { id, role }).await;
    }

    /// Announce a departure to every other registered connection. The caller
    /// removes the entry from the registry afterwards.
    pub async fn announce_disconnect(&self, id: Uuid) {
        self.fan_out(id, PresenceEvent::Disconnected { id }).await;
    }

    /// One send per currently-registered connection, excluding the
    /// originator. No acknowledgement, no retry.
    async fn fan_out(&self, origin: Uuid, event: PresenceEvent) {
        let message = ServerMessage::from(event);
        for client in self.registry.all_except(origin).await {
            if let Err(e) = client.tx.try_send(message.clone()) {
                tracing::warn!(
                    peer = %client.id,
                    error = %e,
                    "Failed to deliver presence event"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn registered(
        registry: &ClientRegistry,
        role: ClientRole,
    ) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(8);
        registry.register(id, role, tx).await;
        (id, rx)
    }

    #[tokio::test]
    async fn connect_reaches_everyone_but_the_originator() {
        let registry = ClientRegistry::new();
        let broadcaster = PresenceBroadcaster::new(registry.clone());

        let (a, mut rx_a) = registered(&registry, ClientRole::Sender).await;
        let (b, mut rx_b) = registered(&registry, ClientRole::Receiver).await;

        broadcaster.announce_connect(b, ClientRole::Receiver).await;

        match rx_a.recv().await.unwrap() {
            ServerMessage::ClientConnected { id, role } => {
                assert_eq!(id, b);
                assert_eq!(role, ClientRole::Receiver);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        // Exactly one event for `a`, none for the originator
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());

        // And symmetrically for `a`'s announcement
        broadcaster.announce_connect(a, ClientRole::Sender).await;
        match rx_b.recv().await.unwrap() {
            ServerMessage::ClientConnected { id, .. } => assert_eq!(id, a),
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_reaches_remaining_connections_once() {
        let registry = ClientRegistry::new();
        let broadcaster = PresenceBroadcaster::new(registry.clone());

        let (a, _rx_a) = registered(&registry, ClientRole::Sender).await;
        let (_b, mut rx_b) = registered(&registry, ClientRole::Receiver).await;
        let (_c, mut rx_c) = registered(&registry, ClientRole::Receiver).await;

        broadcaster.announce_disconnect(a).await;
        registry.unregister(a).await;

        for rx in [&mut rx_b, &mut rx_c] {
            match rx.recv().await.unwrap() {
                ServerMessage::ClientDisconnected { id } => assert_eq!(id, a),
                other => panic!("unexpected message: {other:?}"),
            }
            assert!(rx.try_recv().is_err(), "exactly one event per connection");
        }
        assert!(registry.lookup(a).await.is_none());
    }
}
