// Test doubles shared by the integration tests
//
// Everything here is channel driven so tests can play the backend, the
// microphone and the audio outputs step by step under paused tokio time.

#![allow(dead_code)]

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;
use voice_session::capture::{PermissionState, RecognizerEvent, SpeechRecognizer};
use voice_session::config::{TransportConfig, VoicePolicy};
use voice_session::error::{CaptureError, TransportError};
use voice_session::playback::{AudioPlayer, SpeechSynthesizer};
use voice_session::presenter::{ChannelPresenter, PresentationEvent};
use voice_session::transport::{CommandMessage, Connector, Link, LinkEvent};
use voice_session::{
    SessionConfig, SessionDeps, SessionHandle, SessionSnapshot, StoreReader, VoiceSessionManager,
    VoiceState,
};

/// Transport knobs for tests: default backoff, heartbeat out of the way
pub fn test_transport_config() -> TransportConfig {
    TransportConfig {
        url: "ws://backend.test/ws".to_string(),
        heartbeat_interval_ms: 3_600_000,
        ..TransportConfig::default()
    }
}

/// Let every task run until the runtime is idle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ============================================================================
// Backend
// ============================================================================

struct BackendState {
    accept: bool,
    attempts: Vec<Instant>,
}

/// Test side of the fake backend
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
    conns: mpsc::UnboundedReceiver<ServerConn>,
}

impl MockBackend {
    pub fn new(accept: bool) -> (Self, Arc<MockConnector>) {
        let state = Arc::new(Mutex::new(BackendState {
            accept,
            attempts: Vec::new(),
        }));
        let (conns_tx, conns) = mpsc::unbounded_channel();

        let connector = MockConnector {
            state: Arc::clone(&state),
            conns: conns_tx,
        };
        (Self { state, conns }, Arc::new(connector))
    }

    pub fn set_accept(&self, accept: bool) {
        self.state.lock().unwrap().accept = accept;
    }

    /// Instants of every connect attempt, successful or not
    pub fn attempts(&self) -> Vec<Instant> {
        self.state.lock().unwrap().attempts.clone()
    }

    /// Next accepted connection
    pub async fn accept(&mut self) -> ServerConn {
        self.conns.recv().await.expect("connector dropped")
    }
}

pub struct MockConnector {
    state: Arc<Mutex<BackendState>>,
    conns: mpsc::UnboundedSender<ServerConn>,
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Link>, TransportError> {
        let accept = {
            let mut state = self.state.lock().unwrap();
            state.attempts.push(Instant::now());
            state.accept
        };

        if !accept {
            return Err(TransportError::ConnectFailed("connection refused".into()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let _ = self.conns.send(ServerConn {
            frames: from_client,
            push: to_client,
        });

        Ok(Box::new(MockLink {
            outbound: to_server,
            inbound: from_server,
        }))
    }

    fn endpoint(&self) -> &str {
        "mock://backend"
    }
}

struct MockLink {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

#[async_trait::async_trait]
impl Link for MockLink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(text)
            .map_err(|_| TransportError::SendFailed("server gone".into()))
    }

    async fn next_event(&mut self) -> LinkEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or(LinkEvent::Closed { reconnect: true })
    }

    async fn close(&mut self) {}
}

/// Server end of one accepted connection
pub struct ServerConn {
    frames: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<LinkEvent>,
}

impl ServerConn {
    pub async fn next_frame(&mut self) -> Value {
        let text = self.frames.recv().await.expect("client closed the link");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    /// Next `voice_command`, skipping pings
    pub async fn next_command(&mut self) -> CommandMessage {
        loop {
            let frame = self.next_frame().await;
            if frame["type"] == "voice_command" {
                return serde_json::from_value(frame).expect("malformed voice_command");
            }
        }
    }

    /// Commands already sent and not yet read
    pub fn drain_commands(&mut self) -> Vec<CommandMessage> {
        let mut commands = Vec::new();
        while let Ok(text) = self.frames.try_recv() {
            let frame: Value = serde_json::from_str(&text).expect("client sent invalid JSON");
            if frame["type"] == "voice_command" {
                commands.push(serde_json::from_value(frame).expect("malformed voice_command"));
            }
        }
        commands
    }

    pub fn send_json(&self, frame: Value) {
        let _ = self.push.send(LinkEvent::Text(frame.to_string()));
    }

    pub fn reply(&self, correlation_id: Uuid, text: &str) {
        self.send_json(json!({
            "type": "voice_response",
            "correlation_id": correlation_id,
            "text": text,
            "success": true,
        }));
    }

    pub fn close(&self, reconnect: bool) {
        let _ = self.push.send(LinkEvent::Closed { reconnect });
    }
}

// ============================================================================
// Microphone
// ============================================================================

struct MicState {
    supported: bool,
    permission: PermissionState,
    /// Answer given when the user is prompted
    prompt_answer: PermissionState,
    starts: usize,
    stops: usize,
}

/// Test side of the scripted recognizer
pub struct MicControl {
    state: Arc<Mutex<MicState>>,
    runs: mpsc::UnboundedReceiver<mpsc::Sender<RecognizerEvent>>,
}

impl MicControl {
    pub fn new() -> (Self, ScriptedRecognizer) {
        let state = Arc::new(Mutex::new(MicState {
            supported: true,
            permission: PermissionState::Granted,
            prompt_answer: PermissionState::Granted,
            starts: 0,
            stops: 0,
        }));
        let (runs_tx, runs) = mpsc::unbounded_channel();

        let recognizer = ScriptedRecognizer {
            state: Arc::clone(&state),
            runs: runs_tx,
        };
        (Self { state, runs }, recognizer)
    }

    pub fn set_supported(&self, supported: bool) {
        self.state.lock().unwrap().supported = supported;
    }

    pub fn set_permission(&self, permission: PermissionState, prompt_answer: PermissionState) {
        let mut state = self.state.lock().unwrap();
        state.permission = permission;
        state.prompt_answer = prompt_answer;
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    /// Event sender for the next capture run
    pub async fn next_run(&mut self) -> MicRun {
        MicRun {
            tx: self.runs.recv().await.expect("recognizer dropped"),
        }
    }
}

pub struct MicRun {
    tx: mpsc::Sender<RecognizerEvent>,
}

impl MicRun {
    pub async fn interim(&self, text: &str, confidence: f32) {
        self.emit(RecognizerEvent::Result {
            text: text.to_string(),
            confidence,
            is_final: false,
        })
        .await;
    }

    pub async fn final_result(&self, text: &str, confidence: f32) {
        self.emit(RecognizerEvent::Result {
            text: text.to_string(),
            confidence,
            is_final: true,
        })
        .await;
    }

    /// Send an event; silently dropped if the run was already stopped
    pub async fn emit(&self, event: RecognizerEvent) {
        let _ = self.tx.send(event).await;
    }
}

pub struct ScriptedRecognizer {
    state: Arc<Mutex<MicState>>,
    runs: mpsc::UnboundedSender<mpsc::Sender<RecognizerEvent>>,
}

#[async_trait::async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    fn is_supported(&self) -> bool {
        self.state.lock().unwrap().supported
    }

    async fn permission(&self) -> PermissionState {
        self.state.lock().unwrap().permission
    }

    async fn request_permission(&mut self) -> PermissionState {
        let mut state = self.state.lock().unwrap();
        state.permission = state.prompt_answer;
        state.permission
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<RecognizerEvent>, CaptureError> {
        let (tx, rx) = mpsc::channel(16);
        self.state.lock().unwrap().starts += 1;
        let _ = self.runs.send(tx);
        Ok(rx)
    }

    async fn stop(&mut self) {
        self.state.lock().unwrap().stops += 1;
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Audio outputs
// ============================================================================

/// Output sink that records what it was asked to play, takes a fixed time
/// per item, and tracks how many items were ever playing at once
pub struct FakeSink {
    duration: Duration,
    fail: bool,
    played: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeSink {
    pub fn new(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            fail: false,
            played: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn failing(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            duration,
            fail: true,
            played: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn output(&self, item: &str) -> Result<()> {
        self.played.lock().unwrap().push(item.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        tokio::time::sleep(self.duration).await;
        if self.fail {
            anyhow::bail!("output device unavailable");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for FakeSink {
    async fn speak(&self, text: &str) -> Result<()> {
        self.output(text).await
    }

    fn name(&self) -> &str {
        "fake-speech"
    }
}

#[async_trait::async_trait]
impl AudioPlayer for FakeSink {
    async fn play(&self, audio_ref: &str) -> Result<()> {
        self.output(audio_ref).await
    }

    fn name(&self) -> &str {
        "fake-player"
    }
}

/// Both outputs feeding one shared sink, for overlap checks across sources
pub struct SharedOutput(pub Arc<FakeSink>);

#[async_trait::async_trait]
impl SpeechSynthesizer for SharedOutput {
    async fn speak(&self, text: &str) -> Result<()> {
        self.0.output(text).await
    }

    fn name(&self) -> &str {
        "shared-speech"
    }
}

#[async_trait::async_trait]
impl AudioPlayer for SharedOutput {
    async fn play(&self, audio_ref: &str) -> Result<()> {
        self.0.output(audio_ref).await
    }

    fn name(&self) -> &str {
        "shared-player"
    }
}

// ============================================================================
// Full session
// ============================================================================

pub struct Harness {
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
    pub backend: MockBackend,
    pub mic: MicControl,
    pub speech: Arc<FakeSink>,
    pub player: Arc<FakeSink>,
    pub presented: mpsc::UnboundedReceiver<PresentationEvent>,
    pub level: watch::Sender<f32>,
    pub reader: StoreReader,
}

impl Harness {
    pub fn spawn(policy: VoicePolicy) -> Self {
        Self::spawn_with(policy, FakeSink::new(Duration::from_secs(1)))
    }

    pub fn spawn_with(policy: VoicePolicy, speech: Arc<FakeSink>) -> Self {
        let (backend, connector) = MockBackend::new(true);
        let (mic, recognizer) = MicControl::new();
        let player = FakeSink::new(Duration::from_secs(2));
        let (presenter, presented) = ChannelPresenter::new();
        let (level, level_rx) = watch::channel(0.0f32);

        let deps = SessionDeps {
            recognizer: Box::new(recognizer),
            connector,
            synthesizer: speech.clone(),
            player: player.clone(),
            level: level_rx,
            presenter: Arc::new(presenter),
        };
        let config = SessionConfig {
            policy,
            transport: test_transport_config(),
        };

        let manager = VoiceSessionManager::new(config, deps);
        let (handle, task) = manager.spawn();
        let reader = handle.subscribe();

        Self {
            handle,
            task,
            backend,
            mic,
            speech,
            player,
            presented,
            level,
            reader,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.handle.snapshot()
    }

    /// Wait until the session reaches `status`
    pub async fn wait_status(&mut self, status: VoiceState) -> SessionSnapshot {
        self.wait_for(|s| s.status == status).await
    }

    pub async fn wait_for(&mut self, predicate: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        tokio::time::timeout(Duration::from_secs(600), self.reader.wait_for(predicate))
            .await
            .expect("timed out waiting for session state")
            .expect("session loop stopped")
    }

    /// Start a session and return the first capture run once listening
    pub async fn start_listening(&mut self) -> MicRun {
        self.handle.start().unwrap();
        let run = self.mic.next_run().await;
        self.wait_status(VoiceState::Listening).await;
        run
    }
}

/// Records every published status, in order
pub fn record_statuses(mut reader: StoreReader) -> Arc<Mutex<Vec<VoiceState>>> {
    let log = Arc::new(Mutex::new(vec![reader.snapshot().status]));
    let sink = Arc::clone(&log);
    tokio::spawn(async move {
        while let Some(snapshot) = reader.changed().await {
            let mut log = sink.lock().unwrap();
            if log.last() != Some(&snapshot.status) {
                log.push(snapshot.status);
            }
        }
    });
    log
}

pub fn policy() -> VoicePolicy {
    VoicePolicy::default()
}
