//! Message routing — forwards negotiation messages to their target.
//!
//! The router is a pure pass-through keyed by connection id: no validation,
//! no buffering, no retries, no deduplication. A missing target is routine
//! (the counterpart has not registered yet, or already left), so the sender
//! is never told about it — it infers failure from the silence that follows.

use crate::registry::ClientRegistry;
use aircast_common::NegotiationMessage;
use uuid::Uuid;

/// Result of one forward operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The target was registered and the message was handed to its
    /// connection.
    Delivered,
    /// The target is not in the registry. Dropped silently.
    Dropped,
}

#[derive(Clone)]
pub struct MessageRouter {
    registry: ClientRegistry,
}

impl MessageRouter {
    pub fn new(registry: ClientRegistry) -> Self {
        Self { registry }
    }

    /// Forward `message` to its target, stamped with the originating
    /// connection id. Never blocks on the target's socket: the hand-off is a
    /// non-blocking channel send, and a full or closed outbound queue is
    /// logged and the message discarded.
    pub async fn route(&self, message: NegotiationMessage, from_id: Uuid) -> RouteOutcome {
        let target_id = message.target_id();
        let Some(target) = self.registry.lookup(target_id).await else {
            tracing::debug!(
                from = %from_id,
                to = %target_id,
                kind = message.kind(),
                "Route target not registered, dropping"
            );
            return RouteOutcome::Dropped;
        };

        let kind = message.kind();
        if let Err(e) = target.tx.try_send(message.stamped(from_id)) {
            tracing::warn!(
                from = %from_id,
                to = %target_id,
                kind,
                error = %e,
                "Outbound queue unavailable, message discarded"
            );
        } else {
            tracing::debug!(from = %from_id, to = %target_id, kind, "Forwarded");
        }
        RouteOutcome::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircast_common::{ClientRole, ServerMessage};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn delivers_to_registered_target_with_sender_stamp() {
        let registry = ClientRegistry::new();
        let router = MessageRouter::new(registry.clone());
        let from = Uuid::new_v4();
        let target = Uuid::new_v4();

        let (tx, mut rx) = mpsc::channel(8);
        registry.register(target, ClientRole::Receiver, tx).await;

        let outcome = router
            .route(
                NegotiationMessage::Offer {
                    payload: serde_json::json!({"sdp": "v=0"}),
                    target_id: target,
                },
                from,
            )
            .await;

        assert_eq!(outcome, RouteOutcome::Delivered);
        match rx.recv().await.unwrap() {
            ServerMessage::Offer { offer, sender_id } => {
                assert_eq!(sender_id, from);
                assert_eq!(offer["sdp"], "v=0");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_target_is_dropped_silently() {
        let registry = ClientRegistry::new();
        let router = MessageRouter::new(registry.clone());
        let from = Uuid::new_v4();

        // A bystander that must not receive anything
        let (tx, mut rx) = mpsc::channel(8);
        let bystander = Uuid::new_v4();
        registry.register(bystander, ClientRole::Receiver, tx).await;

        let outcome = router
            .route(
                NegotiationMessage::Answer {
                    payload: serde_json::json!({"sdp": "v=0"}),
                    target_id: Uuid::new_v4(),
                },
                from,
            )
            .await;

        assert_eq!(outcome, RouteOutcome::Dropped);
        assert!(rx.try_recv().is_err(), "no transport send may occur");
    }

    #[tokio::test]
    async fn candidate_routing_preserves_payload() {
        let registry = ClientRegistry::new();
        let router = MessageRouter::new(registry.clone());
        let target = Uuid::new_v4();
        let (tx, mut rx) = mpsc::channel(8);
        registry.register(target, ClientRole::Sender, tx).await;

        let candidate = serde_json::json!({
            "candidate": "candidate:1 1 UDP 2122252543 192.0.2.1 54321 typ host",
            "sdpMid": "0",
        });
        router
            .route(
                NegotiationMessage::IceCandidate {
                    payload: candidate.clone(),
                    target_id: target,
                },
                Uuid::new_v4(),
            )
            .await;

        match rx.recv().await.unwrap() {
            ServerMessage::IceCandidate { candidate: got, .. } => assert_eq!(got, candidate),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
