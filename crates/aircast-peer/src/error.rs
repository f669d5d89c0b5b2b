//! Error types for the peer library.

use thiserror::Error;

/// Errors surfaced by the media seam.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The capture device (or other local media resource) could not be
    /// acquired. A failed start leaves the peer in `Idle`; there is no retry.
    #[error("Capture device unavailable: {0}")]
    CaptureUnavailable(String),

    /// The media channel rejected a description or candidate.
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// The session was already closed.
    #[error("Media session closed")]
    Closed,
}

/// Errors surfaced by the peer library.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Streaming was started twice without an intervening stop.
    #[error("Streaming already started")]
    AlreadyStarted,

    /// Recording was requested before any inbound audio track is live.
    #[error("No inbound audio track to record")]
    NotReceiving,

    /// The peer task (or relay link) is gone.
    #[error("Peer is not running")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, PeerError>;
