use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::{SessionConfig, SessionDeps};
use super::handle::{Control, SessionHandle};
use super::model::{VoiceSession, VoiceState};
use crate::capture::{CaptureEnvelope, CaptureEvent, PermissionState, SpeechCaptureEngine, TranscriptEvent};
use crate::config::VoicePolicy;
use crate::error::ErrorReason;
use crate::playback::{PlaybackContent, PlaybackFinished, PlaybackStatus, ResponsePlayback};
use crate::presenter::PresentationSink;
use crate::store::{ReplyView, SessionSnapshot, SessionStateStore, StoreReader, StoreWriter};
use crate::transport::{
    CommandContext, CommandMessage, ConnectionState, ResponseMessage, TransportClient, TransportEvent,
};

/// Command awaiting its reply, or retained after a failure for one retry
struct PendingCommand {
    message: CommandMessage,
    attempts: u32,
    /// `None` while parked in the error state
    deadline: Option<Instant>,
}

/// Orchestrator for voice interactions
///
/// Owns the session state machine and is the only writer of the
/// [`SessionStateStore`]. Capture, transport, playback, level and user
/// control events are all funneled into one dispatch loop, so transitions
/// are applied strictly one at a time.
pub struct VoiceSessionManager {
    policy: VoicePolicy,
    capture: SpeechCaptureEngine,
    capture_rx: mpsc::UnboundedReceiver<CaptureEnvelope>,
    transport: TransportClient,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    transport_task: JoinHandle<()>,
    playback: ResponsePlayback,
    playback_rx: mpsc::UnboundedReceiver<PlaybackFinished>,
    level: watch::Receiver<f32>,
    level_open: bool,
    presenter: Arc<dyn PresentationSink>,
    store: StoreWriter,
    state: VoiceState,
    session: Option<VoiceSession>,
    pending: Option<PendingCommand>,
    continuous: bool,
    muted: bool,
    lost_total: u64,
}

impl VoiceSessionManager {
    pub fn new(config: SessionConfig, deps: SessionDeps) -> Self {
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();

        let (transport, transport_rx, transport_task) = TransportClient::spawn(
            deps.connector,
            &config.transport,
            config.policy.response_timeout(),
            Arc::clone(&deps.presenter),
        );

        let (store, _) = SessionStateStore::new(SessionSnapshot {
            continuous: config.policy.continuous,
            ..SessionSnapshot::default()
        });

        Self {
            continuous: config.policy.continuous,
            policy: config.policy,
            capture: SpeechCaptureEngine::new(deps.recognizer, capture_tx),
            capture_rx,
            transport,
            transport_rx,
            transport_task,
            playback: ResponsePlayback::new(deps.synthesizer, deps.player, playback_tx),
            playback_rx,
            level: deps.level,
            level_open: true,
            presenter: deps.presenter,
            store,
            state: VoiceState::Idle,
            session: None,
            pending: None,
            muted: false,
            lost_total: 0,
        }
    }

    pub fn reader(&self) -> StoreReader {
        self.store.reader()
    }

    /// Run the dispatch loop on its own task
    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(control_tx, self.reader());
        let task = tokio::spawn(self.run(control_rx));
        (handle, task)
    }

    pub async fn run(mut self, mut control_rx: mpsc::UnboundedReceiver<Control>) {
        info!("Voice session manager started");
        self.transport.reconnect();

        loop {
            let deadline = self.pending.as_ref().and_then(|p| p.deadline);

            tokio::select! {
                control = control_rx.recv() => match control {
                    Some(control) => self.handle_control(control).await,
                    None => break,
                },
                Some(envelope) = self.capture_rx.recv() => self.handle_capture(envelope).await,
                Some(event) = self.transport_rx.recv() => self.handle_transport(event).await,
                Some(done) = self.playback_rx.recv() => self.handle_playback(done).await,
                changed = self.level.changed(), if self.level_open => match changed {
                    Ok(()) => {
                        let level = *self.level.borrow_and_update();
                        self.store.update(|s| s.audio_level = level);
                    }
                    Err(_) => self.level_open = false,
                },
                _ = sleep_until_opt(deadline) => self.handle_response_timeout().await,
            }
        }

        self.end_session("manager shutting down").await;
        self.transport.disconnect().await;
        self.transport_task.abort();
        info!("Voice session manager stopped");
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    async fn handle_control(&mut self, control: Control) {
        debug!("Control {:?} in {:?}", control, self.state);

        match control {
            Control::Start => {
                if self.state != VoiceState::Idle {
                    warn!("Start ignored in {:?}", self.state);
                    return;
                }
                self.begin_session().await;
            }
            Control::Stop => match self.state {
                VoiceState::Listening | VoiceState::Speaking => self.end_session("stopped").await,
                VoiceState::Processing => debug!("Stop ignored while awaiting a reply"),
                VoiceState::Idle | VoiceState::Error => {}
            },
            Control::End => {
                if self.session.is_some() || self.state != VoiceState::Idle {
                    self.end_session("ended").await;
                }
            }
            Control::Retry => {
                if self.state == VoiceState::Error {
                    self.retry().await;
                }
            }
            Control::Acknowledge => {
                if self.state == VoiceState::Error {
                    self.end_session("error acknowledged").await;
                }
            }
            Control::SetMuted(muted) => {
                self.muted = muted;
                self.store.update(|s| s.muted = muted);
                if muted && self.state == VoiceState::Speaking {
                    self.playback.stop().await;
                    self.store.update(|s| s.playback = PlaybackStatus::Idle);
                    self.complete_turn().await;
                }
            }
            Control::SetContinuous(continuous) => {
                self.continuous = continuous;
                self.store.update(|s| s.continuous = continuous);
            }
        }
    }

    async fn begin_session(&mut self) {
        let session = VoiceSession::new();
        let session_id = session.id();
        info!("Voice session {} started", session_id);
        self.session = Some(session);

        self.store.update(|s| {
            s.session_id = Some(session_id);
            s.transcript = None;
            s.confidence = None;
            s.error = None;
        });

        if matches!(
            self.transport.state(),
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            self.transport.reconnect();
        }

        self.listen().await;
    }

    /// Enter `listening`, provided capture is supported and permitted
    async fn listen(&mut self) {
        if !self.capture.is_supported() {
            self.enter_error(ErrorReason::CaptureUnsupported).await;
            return;
        }

        if self.capture.ensure_permission().await != PermissionState::Granted {
            self.enter_error(ErrorReason::PermissionDenied).await;
            return;
        }

        match self.capture.start().await {
            Ok(_) => self.transition(VoiceState::Listening, |s| {
                s.transcript = None;
                s.confidence = None;
                s.error = None;
                s.pending_command = None;
            }),
            Err(e) => {
                warn!("Capture failed to start: {}", e);
                self.enter_error(e.into()).await;
            }
        }
    }

    async fn retry(&mut self) {
        let max_attempts = self.policy.max_command_attempts;

        if matches!(
            self.transport.state(),
            ConnectionState::Disconnected | ConnectionState::Failed
        ) {
            self.transport.reconnect();
        }

        if let Some(pending) = self.pending.as_mut() {
            if pending.attempts < max_attempts {
                pending.attempts += 1;
                pending.deadline = Some(Instant::now() + self.policy.response_timeout());
                let correlation_id = pending.message.correlation_id;
                info!(
                    "Retrying command {} (attempt {}/{})",
                    correlation_id, pending.attempts, max_attempts
                );
                self.transport.send(pending.message.clone());
                self.transition(VoiceState::Processing, |s| {
                    s.error = None;
                    s.pending_command = Some(correlation_id);
                });
                return;
            }
        }

        if let Some(spent) = self.pending.take() {
            info!(
                "Command {} has no attempts left, resuming listening",
                spent.message.correlation_id
            );
            self.retire_lost(spent.message.correlation_id);
        }

        if self.session.is_none() {
            self.transition(VoiceState::Idle, |s| s.error = None);
            self.begin_session().await;
        } else {
            self.listen().await;
        }
    }

    // ------------------------------------------------------------------
    // Capture
    // ------------------------------------------------------------------

    async fn handle_capture(&mut self, envelope: CaptureEnvelope) {
        if !self.capture.is_current(envelope.run) {
            debug!("Dropping capture event from stale run {}", envelope.run);
            return;
        }

        match envelope.event {
            CaptureEvent::Transcript(transcript) => {
                if self.state != VoiceState::Listening {
                    return;
                }
                self.store.update(|s| {
                    s.confidence = Some(transcript.confidence);
                    s.transcript = Some(transcript.clone());
                });

                if !transcript.is_final {
                    return;
                }

                if self.policy.accepts(transcript.confidence) {
                    self.dispatch(transcript).await;
                } else {
                    info!(
                        "Final transcript below confidence gate ({:.2} < {:.2}), not dispatched",
                        transcript.confidence, self.policy.min_confidence
                    );
                }
            }
            CaptureEvent::Ended => {
                self.capture.stop().await;
                if self.state != VoiceState::Listening {
                    return;
                }
                if self.continuous {
                    debug!("Capture ended, restarting (continuous mode)");
                    self.listen().await;
                } else {
                    self.end_session("capture ended").await;
                }
            }
            CaptureEvent::Errored(err) => {
                warn!("Capture error: {}", err);
                self.capture.stop().await;
                self.enter_error(err.into()).await;
            }
        }
    }

    async fn dispatch(&mut self, transcript: TranscriptEvent) {
        // Stop listening so the user is not talking over the reply
        self.capture.stop().await;

        let Some(session) = self.session.as_mut() else {
            warn!("Final transcript without a session, ignored");
            return;
        };

        let message = CommandMessage {
            session_id: session.id(),
            correlation_id: Uuid::new_v4(),
            transcript: transcript.text,
            confidence: transcript.confidence,
            context: CommandContext {
                timestamp: Utc::now(),
                audio_level: *self.level.borrow(),
                previous_correlation_id: session.last_command(),
            },
        };
        session.record_command(message.correlation_id);

        let correlation_id = message.correlation_id;
        info!(
            "Dispatching command {} in session {}: {:?} (confidence {:.2})",
            correlation_id, message.session_id, message.transcript, message.confidence
        );

        self.transport.send(message.clone());
        self.pending = Some(PendingCommand {
            message,
            attempts: 1,
            deadline: Some(Instant::now() + self.policy.response_timeout()),
        });

        self.transition(VoiceState::Processing, |s| {
            s.pending_command = Some(correlation_id);
        });
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(connection) => {
                self.store.update(|s| s.connection = connection);

                if connection == ConnectionState::Failed
                    && matches!(self.state, VoiceState::Listening | VoiceState::Processing)
                {
                    warn!("Backend link failed permanently");
                    if let Some(pending) = self.pending.as_mut() {
                        pending.deadline = None;
                    }
                    self.enter_error(ErrorReason::TransportFailed).await;
                }
            }
            TransportEvent::Response(response) => self.handle_response(response).await,
            TransportEvent::CommandLost(message) => {
                let correlation_id = message.correlation_id;
                let current_session = self.session.as_ref().map(|s| s.id());

                let was_pending = self
                    .pending
                    .as_ref()
                    .map(|p| p.message.correlation_id == correlation_id)
                    .unwrap_or(false);

                if current_session == Some(message.session_id) {
                    if let Some(session) = self.session.as_mut() {
                        session.record_lost();
                    }
                }
                self.count_lost(correlation_id);

                if was_pending {
                    self.pending = None;
                    self.enter_error(ErrorReason::CommandLost { correlation_id })
                        .await;
                }
            }
        }
    }

    async fn handle_response(&mut self, response: ResponseMessage) {
        let matches = self
            .pending
            .as_ref()
            .map(|p| {
                p.message.correlation_id == response.correlation_id
                    && self.session.as_ref().map(|s| s.id()) == Some(p.message.session_id)
            })
            .unwrap_or(false);

        if !matches || !matches!(self.state, VoiceState::Processing | VoiceState::Error) {
            debug!(
                "Discarding response {}: no matching command in the current session",
                response.correlation_id
            );
            return;
        }

        self.pending = None;
        info!("Reply for {}: {:?}", response.correlation_id, response.text);

        if !response.actions.is_empty() {
            self.presenter
                .on_actions(response.correlation_id, &response.actions);
        }

        let reply = ReplyView {
            correlation_id: response.correlation_id,
            text: response.text.clone(),
            audio_ref: response.audio_ref.clone(),
            actions: response.actions.clone(),
            received_at: Utc::now(),
        };

        let content = if self.muted {
            None
        } else {
            PlaybackContent::from_response(&response)
        };

        match content {
            Some(content) => {
                let source = content.source();
                self.playback.start(content).await;
                self.transition(VoiceState::Speaking, |s| {
                    s.pending_command = None;
                    s.error = None;
                    s.last_reply = Some(reply);
                    s.playback = PlaybackStatus::Playing { source };
                });
            }
            None => {
                self.store.update(|s| {
                    s.pending_command = None;
                    s.error = None;
                    s.last_reply = Some(reply);
                });
                self.complete_turn().await;
            }
        }
    }

    async fn handle_response_timeout(&mut self) {
        let max_attempts = self.policy.max_command_attempts;
        let Some(pending) = self.pending.as_mut() else {
            return;
        };

        pending.deadline = None;
        let correlation_id = pending.message.correlation_id;
        let retryable = pending.attempts < max_attempts;

        warn!(
            "No reply for {} within {:?} (attempt {}/{})",
            correlation_id,
            self.policy.response_timeout(),
            pending.attempts,
            max_attempts
        );

        if !retryable {
            self.pending = None;
            self.retire_lost(correlation_id);
            self.store.update(|s| s.pending_command = None);
        }

        self.enter_error(ErrorReason::ResponseTimeout {
            correlation_id,
            retryable,
        })
        .await;
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    async fn handle_playback(&mut self, done: PlaybackFinished) {
        if !self.playback.finish(done.id) {
            debug!("Ignoring completion of cancelled playback {}", done.id);
            return;
        }

        if let Some(error) = &done.error {
            warn!("Playback {} ({:?}) failed: {}", done.id, done.source, error);
        }
        self.store.update(|s| s.playback = PlaybackStatus::Idle);

        if self.state == VoiceState::Speaking {
            self.complete_turn().await;
        }
    }

    /// A reply has been fully delivered
    async fn complete_turn(&mut self) {
        if !self.continuous {
            self.end_session("turn complete").await;
            return;
        }

        if self.transport.state() == ConnectionState::Failed {
            self.enter_error(ErrorReason::TransportFailed).await;
            return;
        }

        self.listen().await;
    }

    // ------------------------------------------------------------------
    // Shared transitions
    // ------------------------------------------------------------------

    async fn enter_error(&mut self, reason: ErrorReason) {
        self.capture.stop().await;
        self.playback.stop().await;

        warn!("Voice session error: {:?}", reason);
        self.transition(VoiceState::Error, |s| {
            s.error = Some(reason);
            s.playback = PlaybackStatus::Idle;
        });
    }

    async fn end_session(&mut self, why: &str) {
        self.capture.stop().await;
        self.playback.stop().await;

        if let Some(pending) = self.pending.take() {
            let correlation_id = pending.message.correlation_id;
            warn!("Command {} unanswered at session end", correlation_id);
            self.retire_lost(correlation_id);
        }

        let summary = self.session.take().map(VoiceSession::finish);
        if let Some(summary) = &summary {
            info!(
                "Voice session {} ended ({}): {} commands, {:.1}s",
                summary.id,
                why,
                summary.commands.len(),
                summary.duration_secs
            );
        }

        self.transition(VoiceState::Idle, |s| {
            s.session_id = None;
            s.pending_command = None;
            s.error = None;
            s.playback = PlaybackStatus::Idle;
            if summary.is_some() {
                s.last_session = summary;
            }
        });
    }

    /// Give up on a command of the current session. Any reply that still
    /// arrives for it is discarded by the transport.
    fn retire_lost(&mut self, correlation_id: Uuid) {
        if let Some(session) = self.session.as_mut() {
            session.record_lost();
        }
        self.count_lost(correlation_id);
        self.transport.forget(correlation_id);
    }

    fn count_lost(&mut self, correlation_id: Uuid) {
        self.lost_total += 1;
        let lost = self.lost_total;
        warn!("Command {} lost ({} total)", correlation_id, lost);
        self.store.update(|s| s.lost_commands = lost);
    }

    /// Change state and apply `f` to the snapshot in a single publish
    fn transition(&mut self, next: VoiceState, f: impl FnOnce(&mut SessionSnapshot)) {
        if self.state != next {
            info!("Voice state {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        self.store.update(|s| {
            s.status = next;
            f(s);
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
