//! Relay transport client.
//!
//! Maintains the WebSocket link to the relay: registers the peer's role on
//! every (re)connect, forwards inbound relay messages to subscribers, and
//! drains an outbound queue. On disconnect it retries a bounded number of
//! times with a fixed delay, then surfaces a terminal [`RelayEvent::Down`].
//! A dead relay link does not tear down an in-progress negotiation — that is
//! the state machine's job.

use crate::error::PeerError;
use aircast_common::{ClientMessage, ClientRole, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Reconnection attempts after a lost link.
pub const RECONNECT_ATTEMPTS: u32 = 5;

/// Fixed delay between reconnection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

const OUTBOUND_QUEUE: usize = 64;

/// Link status and traffic, broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Connected (or reconnected) and registered with the relay.
    Connected,

    /// A message forwarded or broadcast by the relay.
    Message(ServerMessage),

    /// The link dropped; another attempt follows after the fixed delay.
    Reconnecting { attempt: u32 },

    /// Every reconnection attempt failed. Terminal.
    Down,
}

/// Async relay client with bounded auto-reconnect.
///
/// `connect` spawns a background task and returns immediately; use
/// [`subscribe`](Self::subscribe) for events and
/// [`outbound`](Self::outbound) to send. The link closes once every
/// outbound sender has been dropped.
pub struct RelayClient {
    url: String,
    role: ClientRole,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    events: broadcast::Sender<RelayEvent>,
    outbound_tx: mpsc::Sender<ClientMessage>,
    outbound_rx: Option<mpsc::Receiver<ClientMessage>>,
}

impl RelayClient {
    pub fn new(url: impl Into<String>, role: ClientRole) -> Self {
        let (events, _) = broadcast::channel(256);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        Self {
            url: url.into(),
            role,
            reconnect_attempts: RECONNECT_ATTEMPTS,
            reconnect_delay: RECONNECT_DELAY,
            events,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
        }
    }

    /// Override the reconnection policy.
    pub fn with_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self
    }

    /// Subscribe to link events and inbound relay messages.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// A sender feeding the outbound queue. Dropping every clone (including
    /// the client itself) closes the link.
    pub fn outbound(&self) -> mpsc::Sender<ClientMessage> {
        self.outbound_tx.clone()
    }

    /// Spawn the background task that maintains the link. Subsequent calls
    /// are no-ops.
    pub fn connect(&mut self) {
        let Some(mut out_rx) = self.outbound_rx.take() else {
            return;
        };
        let url = self.url.clone();
        let role = self.role;
        let max_attempts = self.reconnect_attempts;
        let delay = self.reconnect_delay;
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut attempts = 0u32;
            loop {
                match run_once(&url, role, &events, &mut out_rx).await {
                    Ok(SessionEnd::Local) => break,
                    Ok(SessionEnd::Remote) => {
                        attempts = 0;
                        tracing::warn!("Relay closed the connection");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Relay link error");
                    }
                }

                attempts += 1;
                if attempts > max_attempts {
                    tracing::error!(attempts = max_attempts, "Relay link down, giving up");
                    let _ = events.send(RelayEvent::Down);
                    break;
                }
                let _ = events.send(RelayEvent::Reconnecting { attempt: attempts });
                sleep(delay).await;
            }
        });
    }
}

/// How one connected session ended.
enum SessionEnd {
    /// The relay closed the socket or the link broke.
    Remote,
    /// All outbound senders were dropped; the peer is shutting down.
    Local,
}

async fn run_once(
    url: &str,
    role: ClientRole,
    events: &broadcast::Sender<RelayEvent>,
    out_rx: &mut mpsc::Receiver<ClientMessage>,
) -> Result<SessionEnd, PeerError> {
    let (ws, _) = connect_async(url).await?;
    let (mut sink, mut stream) = ws.split();

    // Register immediately on every (re)connect so the relay can route to us.
    let register = serde_json::to_string(&ClientMessage::Register { role })?;
    sink.send(Message::Text(register.into())).await?;
    let _ = events.send(RelayEvent::Connected);
    tracing::info!(%role, "Registered with relay");

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(message) => {
                            let _ = events.send(RelayEvent::Message(message));
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "Ignoring malformed relay message");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Remote),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            outbound = out_rx.recv() => match outbound {
                Some(message) => {
                    let text = serde_json::to_string(&message)?;
                    sink.send(Message::Text(text.into())).await?;
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Local);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn registers_on_connect_and_forwards_inbound_messages() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            let (mut sink, mut stream) = ws.split();

            // The first frame is always the registration
            let frame = stream.next().await.unwrap().unwrap();
            let register: ClientMessage =
                serde_json::from_str(frame.to_text().unwrap()).unwrap();
            assert!(matches!(
                register,
                ClientMessage::Register {
                    role: ClientRole::Sender
                }
            ));

            // Hand back one presence event
            let event = serde_json::to_string(&ServerMessage::ClientConnected {
                id: Uuid::new_v4(),
                role: ClientRole::Receiver,
            })
            .unwrap();
            sink.send(Message::Text(event.into())).await.unwrap();

            // Wait for the client's close
            while let Some(Ok(frame)) = stream.next().await {
                if frame.is_close() {
                    break;
                }
            }
        });

        let mut client = RelayClient::new(format!("ws://{addr}"), ClientRole::Sender);
        let mut events = client.subscribe();
        let outbound = client.outbound();
        client.connect();

        assert!(matches!(events.recv().await.unwrap(), RelayEvent::Connected));
        match events.recv().await.unwrap() {
            RelayEvent::Message(ServerMessage::ClientConnected { role, .. }) => {
                assert_eq!(role, ClientRole::Receiver);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Dropping every outbound sender closes the link cleanly
        drop(outbound);
        drop(client);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn reports_down_after_exhausting_reconnect_attempts() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut client = RelayClient::new(format!("ws://{addr}"), ClientRole::Receiver)
            .with_reconnect(2, Duration::from_millis(10));
        let mut events = client.subscribe();
        client.connect();

        let mut attempts = 0u32;
        loop {
            match events.recv().await.unwrap() {
                RelayEvent::Reconnecting { attempt } => {
                    attempts += 1;
                    assert_eq!(attempt, attempts);
                }
                RelayEvent::Down => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(attempts, 2);
    }
}
