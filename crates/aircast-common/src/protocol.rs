//! Relay wire protocol — the messages exchanged between peers and the relay.
//!
//! Everything travels as JSON text frames tagged `{"event": ..., "data": ...}`.
//! Offer/answer/candidate payloads are opaque to the relay: it forwards them
//! verbatim, stamping the sender's connection id so the target knows where to
//! reply.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a peer registers as. The relay tracks exactly one role per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// Captures local audio and offers a stream.
    Sender,
    /// Accepts a stream and plays (or records) it.
    Receiver,
}

impl ClientRole {
    /// The role this role negotiates with.
    pub fn counterpart(self) -> Self {
        match self {
            Self::Sender => Self::Receiver,
            Self::Receiver => Self::Sender,
        }
    }
}

impl std::fmt::Display for ClientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sender => write!(f, "sender"),
            Self::Receiver => write!(f, "receiver"),
        }
    }
}

/// Messages a peer sends to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Announce this connection's role. The relay assigns the connection id.
    Register {
        #[serde(rename = "type")]
        role: ClientRole,
    },

    /// Session-description offer for a specific target connection.
    #[serde(rename_all = "camelCase")]
    Offer {
        offer: serde_json::Value,
        target_id: Uuid,
    },

    /// Session-description answer for a specific target connection.
    #[serde(rename_all = "camelCase")]
    Answer {
        answer: serde_json::Value,
        target_id: Uuid,
    },

    /// Connectivity candidate for a specific target connection.
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        candidate: serde_json::Value,
        target_id: Uuid,
    },
}

/// Messages the relay sends to a peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Another connection registered.
    ClientConnected {
        id: Uuid,
        #[serde(rename = "type")]
        role: ClientRole,
    },

    /// Another connection went away.
    ClientDisconnected { id: Uuid },

    /// A forwarded offer, stamped with the originating connection id.
    #[serde(rename_all = "camelCase")]
    Offer {
        offer: serde_json::Value,
        sender_id: Uuid,
    },

    /// A forwarded answer, stamped with the originating connection id.
    #[serde(rename_all = "camelCase")]
    Answer {
        answer: serde_json::Value,
        sender_id: Uuid,
    },

    /// A forwarded connectivity candidate, stamped with the originating
    /// connection id.
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        candidate: serde_json::Value,
        sender_id: Uuid,
    },
}

/// A negotiation message in flight from one peer to another.
///
/// Exists only for the duration of one forward operation; the relay never
/// parses the payload.
#[derive(Debug, Clone)]
pub enum NegotiationMessage {
    Offer { payload: serde_json::Value, target_id: Uuid },
    Answer { payload: serde_json::Value, target_id: Uuid },
    IceCandidate { payload: serde_json::Value, target_id: Uuid },
}

impl NegotiationMessage {
    /// The connection the message is addressed to.
    pub fn target_id(&self) -> Uuid {
        match self {
            Self::Offer { target_id, .. }
            | Self::Answer { target_id, .. }
            | Self::IceCandidate { target_id, .. } => *target_id,
        }
    }

    /// Message kind for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
        }
    }

    /// Convert into the outbound form, stamped with the originating
    /// connection id in place of the target.
    pub fn stamped(self, sender_id: Uuid) -> ServerMessage {
        match self {
            Self::Offer { payload, .. } => ServerMessage::Offer {
                offer: payload,
                sender_id,
            },
            Self::Answer { payload, .. } => ServerMessage::Answer {
                answer: payload,
                sender_id,
            },
            Self::IceCandidate { payload, .. } => ServerMessage::IceCandidate {
                candidate: payload,
                sender_id,
            },
        }
    }
}

/// A presence notification, broadcast to every other registered connection.
/// Transient and broadcast-only, never stored.
#[derive(Debug, Clone, Copy)]
pub enum PresenceEvent {
    Connected { id: Uuid, role: ClientRole },
    Disconnected { id: Uuid },
}

impl From<PresenceEvent> for ServerMessage {
    fn from(event: PresenceEvent) -> Self {
        match event {
            PresenceEvent::Connected { id, role } => ServerMessage::ClientConnected { id, role },
            PresenceEvent::Disconnected { id } => ServerMessage::ClientDisconnected { id },
        }
    }
}
