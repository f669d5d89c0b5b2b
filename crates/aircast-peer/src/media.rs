//! The media seam — where the actual peer-to-peer engine plugs in.
//!
//! The negotiation state machine never talks to a WebRTC stack directly. It
//! drives a [`MediaSession`] (descriptions and candidates in, descriptions
//! out) and consumes the session's [`MediaEvent`] stream (local candidates,
//! channel state, inbound audio). Descriptions and candidates are opaque
//! JSON: whatever the engine produces is forwarded verbatim through the
//! relay and handed back to the remote engine untouched.

use crate::error::MediaError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Events emitted by a live media session.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// A local connectivity candidate to forward to the remote peer.
    LocalCandidate(Value),

    /// The inbound audio track is live; frames follow at this rate.
    TrackStarted { sample_rate: u32 },

    /// One frame of decoded mono samples from the inbound track.
    AudioFrame(Vec<f32>),

    /// The media channel reached its established state.
    Established,

    /// The media channel disconnected.
    Disconnected,

    /// The media channel failed terminally.
    Failed(String),
}

/// One peer-to-peer media channel.
///
/// On the sending side, opening the session acquires the capture source; on
/// the receiving side it prepares to accept a remote track. All methods are
/// driven from the single peer task.
#[async_trait]
pub trait MediaSession: Send {
    /// Create the local description for an outbound stream.
    async fn create_offer(&mut self) -> Result<Value, MediaError>;

    /// Apply a remote offer and produce the local answer.
    async fn accept_offer(&mut self, offer: Value) -> Result<Value, MediaError>;

    /// Apply the remote answer to a previously created offer.
    async fn accept_answer(&mut self, answer: Value) -> Result<(), MediaError>;

    /// Apply a remote connectivity candidate. Callers must only invoke this
    /// after a remote description has been applied.
    async fn add_remote_candidate(&mut self, candidate: Value) -> Result<(), MediaError>;

    /// Enable or disable the outbound audio track without renegotiating.
    fn set_track_enabled(&mut self, enabled: bool);

    /// Release every resource the session holds: tracks, transports, the
    /// capture source. Must be safe to call on any state.
    async fn close(&mut self);
}

/// Factory for media sessions. One session per negotiation attempt.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn open_session(
        &self,
    ) -> Result<(Box<dyn MediaSession>, mpsc::Receiver<MediaEvent>), MediaError>;
}
