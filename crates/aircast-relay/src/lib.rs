//! # aircast-relay
//!
//! The rendezvous service. Peers connect over WebSocket, register a role,
//! and exchange offer/answer/candidate messages addressed by connection id;
//! the relay forwards them verbatim and broadcasts presence. Media never
//! touches this process — once negotiation succeeds the audio flows directly
//! between the peers.
//!
//! One task per connection; each inbound frame is handled to completion
//! before the next, and registry access is serialized behind a lock, so
//! registration, routing, and presence fan-out never interleave
//! destructively.

pub mod broadcast;
pub mod registry;
pub mod router;

pub use broadcast::PresenceBroadcaster;
pub use registry::{ClientConnection, ClientRegistry};
pub use router::{MessageRouter, RouteOutcome};

use aircast_common::{ClientMessage, NegotiationMessage};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::HeaderValue,
    response::Response,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Capacity of each connection's outbound queue. Routing never blocks on a
/// slow socket; overflow is logged and the message discarded.
const OUTBOUND_QUEUE: usize = 64;

/// Shared relay state.
#[derive(Clone)]
pub struct RelayState {
    pub registry: ClientRegistry,
    pub router: MessageRouter,
    pub broadcaster: PresenceBroadcaster,
    started_at: Instant,
}

impl RelayState {
    pub fn new() -> Self {
        let registry = ClientRegistry::new();
        Self {
            router: MessageRouter::new(registry.clone()),
            broadcaster: PresenceBroadcaster::new(registry.clone()),
            registry,
            started_at: Instant::now(),
        }
    }

    fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the relay router: the WebSocket endpoint plus the status API.
pub fn build_router(state: RelayState, allowed_origins: &str) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/health", get(health))
        .route("/api/info", get(info))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(Arc::new(state))
}

fn cors_layer(allowed_origins: &str) -> CorsLayer {
    if allowed_origins.trim() == "*" {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health(State(state): State<Arc<RelayState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": state.uptime_secs(),
    }))
}

async fn info(State(state): State<Arc<RelayState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "Aircast Relay",
        "version": env!("CARGO_PKG_VERSION"),
        "connected_clients": state.registry.len().await,
        "uptime_secs": state.uptime_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Handle a single peer connection for its whole lifetime.
async fn handle_connection(socket: WebSocket, state: Arc<RelayState>) {
    let (mut sender, mut receiver) = socket.split();

    // Relay-assigned connection identifier, opaque to peers.
    let id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel(OUTBOUND_QUEUE);

    tracing::debug!(client = %id, "Peer connected");

    // ── Send task ────────────────────────────────────────────────────────
    // Drains the outbound queue (router forwards + presence events) onto
    // the socket.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&msg) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // ── Receive loop ─────────────────────────────────────────────────────
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::debug!(client = %id, error = %e, "Ignoring malformed message");
                        continue;
                    }
                };

                match client_msg {
                    ClientMessage::Register { role } => {
                        state.registry.register(id, role, tx.clone()).await;
                        state.broadcaster.announce_connect(id, role).await;
                        tracing::info!(client = %id, %role, "Client registered");
                    }
                    ClientMessage::Offer { offer, target_id } => {
                        state
                            .router
                            .route(
                                NegotiationMessage::Offer {
                                    payload: offer,
                                    target_id,
                                },
                                id,
                            )
                            .await;
                    }
                    ClientMessage::Answer { answer, target_id } => {
                        state
                            .router
                            .route(
                                NegotiationMessage::Answer {
                                    payload: answer,
                                    target_id,
                                },
                                id,
                            )
                            .await;
                    }
                    ClientMessage::IceCandidate {
                        candidate,
                        target_id,
                    } => {
                        state
                            .router
                            .route(
                                NegotiationMessage::IceCandidate {
                                    payload: candidate,
                                    target_id,
                                },
                                id,
                            )
                            .await;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // ── Cleanup ──────────────────────────────────────────────────────────
    // Presence first, then removal: the departing connection is excluded
    // from the fan-out either way.
    state.broadcaster.announce_disconnect(id).await;
    state.registry.unregister(id).await;
    send_task.abort();
    tracing::info!(client = %id, "Peer disconnected");
}
