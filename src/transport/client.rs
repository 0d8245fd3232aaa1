use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backoff::Backoff;
use super::link::{Connector, Link, LinkEvent};
use super::messages::{parse_inbound, CommandMessage, InboundMessage, OutboundMessage, ResponseMessage};
use super::queue::{PendingQueue, QueuedCommand};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::presenter::PresentationSink;

/// Lifecycle of the backend link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// What the transport reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    StateChanged(ConnectionState),
    /// Reply matched to a command this client sent
    Response(ResponseMessage),
    /// Command evicted from a full pending queue
    CommandLost(CommandMessage),
}

enum Request {
    Connect(Option<oneshot::Sender<ConnectionState>>),
    Send(CommandMessage),
    Forget(Uuid),
    Disconnect(oneshot::Sender<()>),
}

/// Handle to the connection task
///
/// All link state lives in a single task; this handle only posts requests to
/// it, so it is cheap to clone and never blocks on the network.
#[derive(Clone)]
pub struct TransportClient {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ConnectionState>,
}

impl TransportClient {
    /// Spawn the connection task. `expiry` is how long a queued command may
    /// wait before it becomes the preferred eviction victim.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        config: &TransportConfig,
        expiry: Duration,
        presenter: Arc<dyn PresentationSink>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>, JoinHandle<()>) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let heartbeat = config.heartbeat_interval().max(Duration::from_millis(10));
        let actor = TransportActor {
            connector,
            link: None,
            state: ConnectionState::Disconnected,
            state_tx,
            events_tx,
            presenter,
            queue: PendingQueue::new(config.queue_capacity, expiry),
            outstanding: HashSet::new(),
            backoff: Backoff::new(config.backoff_base(), config.backoff_max(), config.max_attempts),
            retry_at: None,
            waiters: Vec::new(),
            attempt_timeout: config.attempt_timeout(),
            heartbeat,
            last_inbound: Instant::now(),
            next_ping: Instant::now() + heartbeat,
        };

        let task = tokio::spawn(actor.run(requests_rx));

        (
            Self {
                requests: requests_tx,
                state: state_rx,
            },
            events_rx,
            task,
        )
    }

    /// Connect, returning once the link is `Connected` or `Failed`.
    /// Concurrent calls share the attempt already in flight.
    pub async fn connect(&self) -> ConnectionState {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(Request::Connect(Some(tx))).is_err() {
            return ConnectionState::Failed;
        }
        rx.await.unwrap_or(ConnectionState::Failed)
    }

    /// Ask for a connection without waiting for the outcome
    pub fn reconnect(&self) {
        let _ = self.requests.send(Request::Connect(None));
    }

    /// Submit a command. Transmitted now if connected, queued otherwise.
    pub fn send(&self, message: CommandMessage) {
        if self.requests.send(Request::Send(message)).is_err() {
            error!("Transport task is gone, command dropped");
        }
    }

    /// Stop tracking a command the caller has given up on. It is dropped
    /// from the queue if still there, and a late reply for it is discarded.
    pub fn forget(&self, correlation_id: Uuid) {
        let _ = self.requests.send(Request::Forget(correlation_id));
    }

    /// Close the link. Queued commands are kept.
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(Request::Disconnect(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

struct TransportActor {
    connector: Arc<dyn Connector>,
    link: Option<Box<dyn Link>>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    presenter: Arc<dyn PresentationSink>,
    queue: PendingQueue,
    /// Correlation ids sent or queued and not yet answered or forgotten
    outstanding: HashSet<Uuid>,
    backoff: Backoff,
    retry_at: Option<Instant>,
    waiters: Vec<oneshot::Sender<ConnectionState>>,
    attempt_timeout: Duration,
    heartbeat: Duration,
    last_inbound: Instant,
    next_ping: Instant,
}

impl TransportActor {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        info!("Transport task started for {}", self.connector.endpoint());

        loop {
            let retry_at = self.retry_at;
            let ping_at = self.link.as_ref().map(|_| self.next_ping);

            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                event = next_link_event(&mut self.link) => self.handle_link_event(event).await,
                _ = sleep_until_opt(retry_at) => {
                    self.retry_at = None;
                    self.attempt().await;
                }
                _ = sleep_until_opt(ping_at) => self.heartbeat().await,
            }
        }

        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        info!("Transport task stopped");
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect(waiter) => self.handle_connect(waiter).await,
            Request::Send(message) => self.handle_send(message).await,
            Request::Forget(correlation_id) => {
                self.outstanding.remove(&correlation_id);
                if self.queue.remove(correlation_id).is_some() {
                    debug!("Dropped queued command {}", correlation_id);
                }
            }
            Request::Disconnect(ack) => {
                self.retry_at = None;
                if let Some(mut link) = self.link.take() {
                    link.close().await;
                }
                self.set_state(ConnectionState::Disconnected);
                self.resolve_waiters();
                info!("Disconnected ({} commands still queued)", self.queue.len());
                let _ = ack.send(());
            }
        }
    }

    async fn handle_connect(&mut self, waiter: Option<oneshot::Sender<ConnectionState>>) {
        if let Some(waiter) = waiter {
            if self.state == ConnectionState::Connected {
                let _ = waiter.send(ConnectionState::Connected);
                return;
            }
            self.waiters.push(waiter);
        }

        match self.state {
            ConnectionState::Connected => {}
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                debug!("Connect requested while an attempt is pending");
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.backoff.reset();
                self.retry_at = None;
                self.attempt().await;
            }
        }
    }

    async fn handle_send(&mut self, message: CommandMessage) {
        self.outstanding.insert(message.correlation_id);

        if self.state == ConnectionState::Connected && self.queue.is_empty() {
            let entry = QueuedCommand {
                message,
                enqueued_at: Instant::now(),
            };
            if let Err(e) = transmit(&mut self.link, &entry.message).await {
                warn!("Send failed, queueing {}: {}", entry.message.correlation_id, e);
                self.queue.push_front(entry);
                self.link_lost(true).await;
            } else {
                debug!("Sent command {}", entry.message.correlation_id);
            }
            return;
        }

        let correlation_id = message.correlation_id;
        if let Some(evicted) = self.queue.push(message, Instant::now()) {
            warn!(
                "Pending queue full ({}), command {} lost",
                self.queue.capacity(),
                evicted.correlation_id
            );
            self.outstanding.remove(&evicted.correlation_id);
            let _ = self.events_tx.send(TransportEvent::CommandLost(evicted));
        }
        debug!(
            "Queued command {} while {:?} ({} pending)",
            correlation_id,
            self.state,
            self.queue.len()
        );
    }

    async fn attempt(&mut self) {
        if self.state != ConnectionState::Reconnecting {
            self.set_state(ConnectionState::Connecting);
        }

        let attempt = timeout(self.attempt_timeout, self.connector.connect()).await;
        let error = match attempt {
            Ok(Ok(link)) => {
                self.link = Some(link);
                self.backoff.reset();
                self.last_inbound = Instant::now();
                self.next_ping = Instant::now() + self.heartbeat;
                self.set_state(ConnectionState::Connected);

                if let Err(e) = self.flush().await {
                    warn!("Flush interrupted: {}", e);
                    self.link_lost(true).await;
                    return;
                }
                self.resolve_waiters();
                return;
            }
            Ok(Err(e)) => e,
            Err(_) => TransportError::AttemptTimedOut(self.attempt_timeout.as_millis() as u64),
        };

        warn!(
            "Connect to {} failed (attempt {}): {}",
            self.connector.endpoint(),
            self.backoff.attempt(),
            error
        );
        self.schedule_retry();
    }

    /// Transmit every queued command in enqueue order
    async fn flush(&mut self) -> Result<(), TransportError> {
        if !self.queue.is_empty() {
            info!("Flushing {} queued commands", self.queue.len());
        }
        while let Some(entry) = self.queue.pop_front() {
            if let Err(e) = transmit(&mut self.link, &entry.message).await {
                self.queue.push_front(entry);
                return Err(e);
            }
        }
        Ok(())
    }

    fn schedule_retry(&mut self) {
        match self.backoff.next_delay() {
            Some(delay) => {
                self.set_state(ConnectionState::Reconnecting);
                self.retry_at = Some(Instant::now() + delay);
                info!(
                    "Reconnect attempt {} in {:?}",
                    self.backoff.attempt(),
                    delay
                );
            }
            None => {
                error!("Reconnect attempts exhausted");
                self.fail();
            }
        }
    }

    fn fail(&mut self) {
        self.link = None;
        self.retry_at = None;
        self.set_state(ConnectionState::Failed);
        self.resolve_waiters();
    }

    async fn link_lost(&mut self, reconnect: bool) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        if reconnect {
            warn!("Link lost, reconnecting ({} queued)", self.queue.len());
            self.backoff.reset();
            self.schedule_retry();
        } else {
            error!("Server refused reconnection");
            self.fail();
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Text(text) => {
                self.last_inbound = Instant::now();
                self.handle_frame(&text);
            }
            LinkEvent::Closed { reconnect } => {
                self.link = None;
                self.link_lost(reconnect).await;
            }
        }
    }

    fn handle_frame(&mut self, text: &str) {
        match parse_inbound(text) {
            Ok(InboundMessage::Response(response)) => {
                if self.outstanding.remove(&response.correlation_id) {
                    let _ = self.events_tx.send(TransportEvent::Response(response));
                } else {
                    warn!(
                        "Ignoring response for unknown command {}",
                        response.correlation_id
                    );
                }
            }
            Ok(InboundMessage::LateAudio { payload }) => self.presenter.on_update(&payload),
            Ok(InboundMessage::Update(payload)) => self.presenter.on_update(&payload),
            Ok(InboundMessage::Processing) => debug!("Backend is processing"),
            Ok(InboundMessage::Liveness) => {}
            Ok(InboundMessage::ServerError { message }) => warn!("Backend error: {}", message),
            Err(e) => warn!("Protocol error, frame ignored: {}", e),
        }
    }

    async fn heartbeat(&mut self) {
        let now = Instant::now();
        if now.saturating_duration_since(self.last_inbound) >= self.heartbeat * 2 {
            warn!("No traffic for {:?}, treating link as dead", self.heartbeat * 2);
            self.link_lost(true).await;
            return;
        }

        self.next_ping = now + self.heartbeat;
        let ping = OutboundMessage::Ping {
            timestamp: chrono::Utc::now(),
        };
        if let Some(link) = self.link.as_mut() {
            if let Err(e) = link.send_text(ping.to_text()).await {
                warn!("Heartbeat failed: {}", e);
                self.link_lost(true).await;
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!("Connection {:?} -> {:?}", self.state, state);
        self.state = state;
        self.state_tx.send_replace(state);
        let _ = self.events_tx.send(TransportEvent::StateChanged(state));
    }

    fn resolve_waiters(&mut self) {
        let state = self.state;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(state);
        }
    }
}

async fn transmit(
    link: &mut Option<Box<dyn Link>>,
    message: &CommandMessage,
) -> Result<(), TransportError> {
    let link = link.as_mut().ok_or(TransportError::Closed)?;
    let frame = OutboundMessage::VoiceCommand(message.clone()).to_text();
    link.send_text(frame).await
}

async fn next_link_event(link: &mut Option<Box<dyn Link>>) -> LinkEvent {
    match link.as_mut() {
        Some(link) => link.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
