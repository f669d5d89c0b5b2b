//! # aircast-peer
//!
//! The peer side of Aircast: a relay transport client with bounded
//! reconnection, and the negotiation state machine that runs identically in
//! the sender and the receiver. The actual media engine plugs in behind the
//! [`media::MediaEngine`] seam; this crate owns everything up to it —
//! registration, presence handling, offer/answer/candidate flow, candidate
//! buffering, mute, and recording.
//!
//! ```rust,no_run
//! use aircast_peer::{spawn_peer, ClientRole};
//! # use aircast_peer::media::MediaEngine;
//! # use std::sync::Arc;
//! # async fn demo(engine: Arc<dyn MediaEngine>) -> aircast_peer::Result<()> {
//! let peer = spawn_peer(ClientRole::Sender, "ws://localhost:3000/ws", engine);
//! peer.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod media;
pub mod session;
pub mod transport;

pub use aircast_common::ClientRole;
pub use error::{MediaError, PeerError, Result};
pub use media::{MediaEngine, MediaEvent, MediaSession};
pub use session::{run_peer, spawn_peer, Negotiation, PeerCommand, PeerHandle, PeerState};
pub use transport::{RelayClient, RelayEvent};
