//! # Aircast relay server
//!
//! Binds the rendezvous relay: the WebSocket endpoint peers register on and
//! exchange negotiation messages through, plus the status API. Media never
//! flows through this process, so a single small instance serves a pair of
//! peers comfortably.
//!
//! TLS termination, static page serving, and anything else in front of the
//! relay belongs to the deployment, not this binary.

use aircast_relay::RelayState;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = aircast_common::config::init()?;

    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aircast=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .init();

    tracing::info!("Starting Aircast relay v{}", env!("CARGO_PKG_VERSION"));

    let state = RelayState::new();
    let router = aircast_relay::build_router(state, &config.cors.allowed_origins);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Relay listening on ws://{addr}/ws");
    tracing::info!("Status API on http://{addr}/api/health");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
