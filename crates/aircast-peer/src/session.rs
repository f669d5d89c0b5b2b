//! Per-peer negotiation state machine.
//!
//! One instance runs inside each peer — sender and receiver — loosely
//! coupled only through relay-delivered messages. All mutable session state
//! lives on a single task: relay messages, media events, and user commands
//! arrive on channels consumed by one `select!` loop, so no locks are
//! needed.
//!
//! The sender's path: start (acquire capture) → offer when a receiver is
//! known → `Offering` → apply the answer → `Connected`. The receiver's
//! path: an inbound offer → apply, answer → `Answering` → media channel
//! established → `Connected`. Either side drops to `Disconnected` when the
//! counterpart leaves or the user stops, and to `Failed` on a terminal
//! media failure; both paths release every acquired resource.

use crate::error::PeerError;
use crate::media::{MediaEngine, MediaEvent, MediaSession};
use crate::transport::RelayEvent;
use aircast_audio::{CaptureBuffer, EncodedAudioFile};
use aircast_common::{ClientMessage, ClientRole, ServerMessage};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use uuid::Uuid;

/// Negotiation lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No negotiation in progress.
    Idle,
    /// Sender: local description created and sent, awaiting the answer.
    Offering,
    /// Receiver: remote offer applied and answer sent, awaiting the media
    /// channel.
    Answering,
    /// Media is flowing.
    Connected,
    /// Torn down by the counterpart leaving or a local stop.
    Disconnected,
    /// Torn down by a terminal media failure.
    Failed,
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Offering => "offering",
            Self::Answering => "answering",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Commands from the embedding application to the peer task.
#[derive(Debug)]
pub enum PeerCommand {
    /// Start streaming (sender) or receiving (receiver).
    Start {
        reply: mpsc::Sender<Result<(), PeerError>>,
    },
    /// Stop and release all media resources.
    Stop,
    /// Toggle the outbound audio track without renegotiating.
    SetMuted(bool),
    /// Begin recording the inbound track.
    StartRecording {
        reply: mpsc::Sender<Result<(), PeerError>>,
    },
    /// Stop recording and collect the encoded file, if anything was captured.
    StopRecording {
        reply: mpsc::Sender<Option<EncodedAudioFile>>,
    },
}

/// The negotiation state machine proper. Drive it from a single task; see
/// [`run_peer`] for the canonical loop and [`spawn_peer`] for the packaged
/// version.
pub struct Negotiation {
    role: ClientRole,
    engine: Arc<dyn MediaEngine>,
    outbound: mpsc::Sender<ClientMessage>,
    state: PeerState,
    remote_id: Option<Uuid>,
    streaming: bool,
    remote_description_set: bool,
    pending_candidates: Vec<Value>,
    media: Option<Box<dyn MediaSession>>,
    inbound_rate: Option<u32>,
    recorder: Option<CaptureBuffer>,
    finished_recording: Option<EncodedAudioFile>,
}

impl Negotiation {
    pub fn new(
        role: ClientRole,
        engine: Arc<dyn MediaEngine>,
        outbound: mpsc::Sender<ClientMessage>,
    ) -> Self {
        Self {
            role,
            engine,
            outbound,
            state: PeerState::Idle,
            remote_id: None,
            streaming: false,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            media: None,
            inbound_rate: None,
            recorder: None,
            finished_recording: None,
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn remote_id(&self) -> Option<Uuid> {
        self.remote_id
    }

    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    /// The local start action. Acquires the media session (capture source
    /// included); a sender with a known counterpart offers immediately,
    /// otherwise the offer waits for the counterpart's presence event.
    ///
    /// On failure nothing is acquired and the state stays `Idle`.
    pub async fn start(&mut self) -> Result<mpsc::Receiver<MediaEvent>, PeerError> {
        if self.media.is_some() {
            return Err(PeerError::AlreadyStarted);
        }
        let (session, events) = self.engine.open_session().await?;
        self.media = Some(session);
        self.streaming = true;
        self.state = PeerState::Idle;

        if self.role == ClientRole::Sender {
            if let Some(remote) = self.remote_id {
                self.send_offer(remote).await;
            }
        }
        Ok(events)
    }

    /// The local stop action: release everything, report `Disconnected`.
    pub async fn stop(&mut self) {
        self.teardown().await;
        self.state = PeerState::Disconnected;
        tracing::info!("Stopped");
    }

    /// Toggle the outbound track. No renegotiation, no state change.
    pub fn set_muted(&mut self, muted: bool) {
        if let Some(media) = self.media.as_mut() {
            media.set_track_enabled(!muted);
            tracing::debug!(muted, "Outbound track toggled");
        }
    }

    /// Begin recording the inbound track at its reported sample rate.
    pub fn start_recording(&mut self) -> Result<(), PeerError> {
        let Some(rate) = self.inbound_rate else {
            return Err(PeerError::NotReceiving);
        };
        if self.recorder.is_none() {
            self.recorder = Some(CaptureBuffer::new(rate));
            tracing::info!(sample_rate = rate, "Recording started");
        }
        Ok(())
    }

    /// Stop recording and encode. Also yields the file when the session was
    /// torn down while a recording was active.
    pub fn stop_recording(&mut self) -> Option<EncodedAudioFile> {
        if let Some(mut recorder) = self.recorder.take() {
            let file = recorder.finish();
            tracing::info!(bytes = file.len(), "Recording stopped");
            return Some(file);
        }
        self.finished_recording.take()
    }

    /// Handle one relay-delivered message. Returns a fresh media event
    /// receiver when handling it opened a session (a receiver answering an
    /// offer that arrived before its local start action).
    pub async fn on_message(
        &mut self,
        message: ServerMessage,
    ) -> Option<mpsc::Receiver<MediaEvent>> {
        match message {
            ServerMessage::ClientConnected { id, role } => {
                if role == self.role.counterpart() {
                    self.remote_id = Some(id);
                    tracing::info!(remote = %id, %role, "Counterpart present");
                    if self.role == ClientRole::Sender
                        && self.streaming
                        && self.state == PeerState::Idle
                    {
                        self.send_offer(id).await;
                    }
                }
                None
            }
            ServerMessage::ClientDisconnected { id } => {
                if self.remote_id == Some(id) {
                    tracing::info!(remote = %id, "Counterpart left");
                    self.teardown().await;
                    self.state = PeerState::Disconnected;
                }
                None
            }
            ServerMessage::Offer { offer, sender_id } => self.on_offer(offer, sender_id).await,
            ServerMessage::Answer { answer, sender_id } => {
                self.on_answer(answer, sender_id).await;
                None
            }
            ServerMessage::IceCandidate { candidate, .. } => {
                self.on_candidate(candidate).await;
                None
            }
        }
    }

    /// Handle one event from the media session.
    pub async fn on_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::LocalCandidate(candidate) => {
                // A candidate is only useful once we know whom to address it to.
                let Some(remote) = self.remote_id else { return };
                if self
                    .outbound
                    .send(ClientMessage::IceCandidate {
                        candidate,
                        target_id: remote,
                    })
                    .await
                    .is_err()
                {
                    tracing::warn!("Relay link closed, candidate not sent");
                }
            }
            MediaEvent::TrackStarted { sample_rate } => {
                self.inbound_rate = Some(sample_rate);
                tracing::info!(sample_rate, "Inbound audio track live");
            }
            MediaEvent::AudioFrame(frame) => {
                if let Some(recorder) = self.recorder.as_mut() {
                    recorder.push_frame(&frame);
                }
            }
            MediaEvent::Established => {
                if self.state == PeerState::Answering {
                    self.state = PeerState::Connected;
                    tracing::info!("Media channel established");
                }
            }
            MediaEvent::Disconnected => {
                tracing::info!("Media channel disconnected");
                self.teardown().await;
                self.state = PeerState::Disconnected;
            }
            MediaEvent::Failed(reason) => {
                self.fail(&reason).await;
            }
        }
    }

    async fn send_offer(&mut self, remote: Uuid) {
        let result = match self.media.as_mut() {
            Some(media) => media.create_offer().await,
            None => return,
        };
        match result {
            Ok(offer) => {
                if self
                    .outbound
                    .send(ClientMessage::Offer {
                        offer,
                        target_id: remote,
                    })
                    .await
                    .is_err()
                {
                    tracing::warn!("Relay link closed, offer not sent");
                    return;
                }
                self.state = PeerState::Offering;
                tracing::info!(to = %remote, "Offer sent");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create offer");
                self.fail("offer creation failed").await;
            }
        }
    }

    async fn on_offer(
        &mut self,
        offer: Value,
        sender_id: Uuid,
    ) -> Option<mpsc::Receiver<MediaEvent>> {
        if self.role != ClientRole::Receiver {
            tracing::debug!(from = %sender_id, "Ignoring offer, not a receiver");
            return None;
        }

        // An offer can arrive before the local start action; open the
        // session on demand.
        let mut opened = None;
        if self.media.is_none() {
            match self.engine.open_session().await {
                Ok((session, events)) => {
                    self.media = Some(session);
                    opened = Some(events);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Cannot open media session for offer");
                    return None;
                }
            }
        }

        self.remote_id = Some(sender_id);
        let result = match self.media.as_mut() {
            Some(media) => media.accept_offer(offer).await,
            None => return opened,
        };
        match result {
            Ok(answer) => {
                self.remote_description_set = true;
                self.flush_pending_candidates().await;
                if self
                    .outbound
                    .send(ClientMessage::Answer {
                        answer,
                        target_id: sender_id,
                    })
                    .await
                    .is_err()
                {
                    tracing::warn!("Relay link closed, answer not sent");
                }
                self.state = PeerState::Answering;
                tracing::info!(remote = %sender_id, "Answer sent");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to apply remote offer");
                self.fail("remote offer rejected").await;
            }
        }
        opened
    }

    async fn on_answer(&mut self, answer: Value, sender_id: Uuid) {
        if self.state != PeerState::Offering || self.remote_id != Some(sender_id) {
            tracing::debug!(from = %sender_id, state = %self.state, "Ignoring answer");
            return;
        }
        let result = match self.media.as_mut() {
            Some(media) => media.accept_answer(answer).await,
            None => return,
        };
        match result {
            Ok(()) => {
                self.remote_description_set = true;
                self.flush_pending_candidates().await;
                self.state = PeerState::Connected;
                tracing::info!(remote = %sender_id, "Answer applied");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to apply remote answer");
                self.fail("remote answer rejected").await;
            }
        }
    }

    async fn on_candidate(&mut self, candidate: Value) {
        // Candidates may legitimately beat the remote description; hold them
        // until it lands.
        if !self.remote_description_set || self.media.is_none() {
            self.pending_candidates.push(candidate);
            return;
        }
        if let Some(media) = self.media.as_mut() {
            if let Err(e) = media.add_remote_candidate(candidate).await {
                tracing::warn!(error = %e, "Failed to apply remote candidate");
            }
        }
    }

    async fn flush_pending_candidates(&mut self) {
        if self.pending_candidates.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_candidates);
        let Some(media) = self.media.as_mut() else {
            return;
        };
        tracing::debug!(count = pending.len(), "Applying buffered candidates");
        for candidate in pending {
            if let Err(e) = media.add_remote_candidate(candidate).await {
                tracing::warn!(error = %e, "Failed to apply buffered candidate");
            }
        }
    }

    async fn fail(&mut self, reason: &str) {
        self.teardown().await;
        self.state = PeerState::Failed;
        tracing::warn!(reason, "Negotiation failed");
    }

    /// Release every acquired resource and clear the session bindings. Runs
    /// on every exit path — stop, counterpart departure, media failure.
    async fn teardown(&mut self) {
        if let Some(mut media) = self.media.take() {
            media.close().await;
        }
        if let Some(mut recorder) = self.recorder.take() {
            if recorder.sample_count() > 0 {
                self.finished_recording = Some(recorder.finish());
            }
        }
        self.remote_id = None;
        self.remote_description_set = false;
        self.pending_candidates.clear();
        self.inbound_rate = None;
        self.streaming = false;
    }
}

/// Everything the peer loop can wake up on.
enum LoopEvent {
    Command(Option<PeerCommand>),
    Relay(Result<RelayEvent, broadcast::error::RecvError>),
    Media(Option<MediaEvent>),
}

/// The canonical peer event loop: owns the negotiation state machine and
/// multiplexes user commands, relay traffic, and media events. Publishes
/// every state change on `status`. Runs until the command channel closes.
pub async fn run_peer(
    role: ClientRole,
    engine: Arc<dyn MediaEngine>,
    outbound: mpsc::Sender<ClientMessage>,
    mut relay_events: broadcast::Receiver<RelayEvent>,
    mut commands: mpsc::Receiver<PeerCommand>,
    status: watch::Sender<PeerState>,
) {
    let mut negotiation = Negotiation::new(role, engine, outbound);
    let mut media_events: Option<mpsc::Receiver<MediaEvent>> = None;

    loop {
        let event = tokio::select! {
            command = commands.recv() => LoopEvent::Command(command),
            relay = relay_events.recv() => LoopEvent::Relay(relay),
            media = async {
                match media_events.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending::<Option<MediaEvent>>().await,
                }
            } => LoopEvent::Media(media),
        };

        match event {
            LoopEvent::Command(None) => {
                negotiation.stop().await;
                break;
            }
            LoopEvent::Command(Some(command)) => match command {
                PeerCommand::Start { reply } => match negotiation.start().await {
                    Ok(events) => {
                        media_events = Some(events);
                        let _ = reply.try_send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.try_send(Err(e));
                    }
                },
                PeerCommand::Stop => negotiation.stop().await,
                PeerCommand::SetMuted(muted) => negotiation.set_muted(muted),
                PeerCommand::StartRecording { reply } => {
                    let _ = reply.try_send(negotiation.start_recording());
                }
                PeerCommand::StopRecording { reply } => {
                    let _ = reply.try_send(negotiation.stop_recording());
                }
            },
            LoopEvent::Relay(Ok(RelayEvent::Message(message))) => {
                if let Some(events) = negotiation.on_message(message).await {
                    media_events = Some(events);
                }
            }
            LoopEvent::Relay(Ok(RelayEvent::Connected)) => {
                tracing::debug!("Relay link up");
            }
            LoopEvent::Relay(Ok(RelayEvent::Reconnecting { attempt })) => {
                tracing::warn!(attempt, "Relay link lost, reconnecting");
            }
            LoopEvent::Relay(Ok(RelayEvent::Down)) => {
                // Terminal for the transport, not for the session: an
                // established stream keeps flowing until it fails or is
                // stopped on its own terms.
                tracing::error!("Relay link down");
            }
            LoopEvent::Relay(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, "Relay event stream lagged");
            }
            LoopEvent::Relay(Err(broadcast::error::RecvError::Closed)) => {
                negotiation.stop().await;
                break;
            }
            LoopEvent::Media(Some(event)) => {
                negotiation.on_media_event(event).await;
            }
            LoopEvent::Media(None) => {
                media_events = None;
            }
        }

        if !negotiation.has_media() {
            media_events = None;
        }
        let _ = status.send(negotiation.state());
    }
}

/// Handle to a spawned peer task.
pub struct PeerHandle {
    commands: mpsc::Sender<PeerCommand>,
    status: watch::Receiver<PeerState>,
}

impl PeerHandle {
    pub async fn start(&self) -> Result<(), PeerError> {
        let (reply, mut rx) = mpsc::channel(1);
        self.commands
            .send(PeerCommand::Start { reply })
            .await
            .map_err(|_| PeerError::NotConnected)?;
        rx.recv().await.unwrap_or(Err(PeerError::NotConnected))
    }

    pub async fn stop(&self) -> Result<(), PeerError> {
        self.commands
            .send(PeerCommand::Stop)
            .await
            .map_err(|_| PeerError::NotConnected)
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), PeerError> {
        self.commands
            .send(PeerCommand::SetMuted(muted))
            .await
            .map_err(|_| PeerError::NotConnected)
    }

    pub async fn start_recording(&self) -> Result<(), PeerError> {
        let (reply, mut rx) = mpsc::channel(1);
        self.commands
            .send(PeerCommand::StartRecording { reply })
            .await
            .map_err(|_| PeerError::NotConnected)?;
        rx.recv().await.unwrap_or(Err(PeerError::NotConnected))
    }

    pub async fn stop_recording(&self) -> Result<Option<EncodedAudioFile>, PeerError> {
        let (reply, mut rx) = mpsc::channel(1);
        self.commands
            .send(PeerCommand::StopRecording { reply })
            .await
            .map_err(|_| PeerError::NotConnected)?;
        rx.recv().await.ok_or(PeerError::NotConnected)
    }

    /// Observe negotiation state changes.
    pub fn status(&self) -> watch::Receiver<PeerState> {
        self.status.clone()
    }
}

/// Connect to the relay and spawn the peer task. The returned handle is the
/// only way to drive the peer; dropping it shuts everything down.
pub fn spawn_peer(
    role: ClientRole,
    relay_url: impl Into<String>,
    engine: Arc<dyn MediaEngine>,
) -> PeerHandle {
    let mut relay = crate::transport::RelayClient::new(relay_url, role);
    let relay_events = relay.subscribe();
    let outbound = relay.outbound();
    relay.connect();

    let (commands, cmd_rx) = mpsc::channel(16);
    let (status_tx, status) = watch::channel(PeerState::Idle);
    tokio::spawn(run_peer(role, engine, outbound, relay_events, cmd_rx, status_tx));

    PeerHandle { commands, status }
}
