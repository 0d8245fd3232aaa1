//! Boundary to the presentation layer
//!
//! The voice core never interprets calendar side effects or push updates; it
//! only hands them over here.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

pub trait PresentationSink: Send + Sync {
    /// Opaque side-effect actions carried by a reply
    fn on_actions(&self, correlation_id: Uuid, actions: &[Value]);

    /// Push traffic unrelated to an outstanding command
    fn on_update(&self, payload: &Value);
}

/// Logs everything it receives
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl PresentationSink for LogPresenter {
    fn on_actions(&self, correlation_id: Uuid, actions: &[Value]) {
        for action in actions {
            info!("Action for {}: {}", correlation_id, action);
        }
    }

    fn on_update(&self, payload: &Value) {
        info!("Update: {}", payload);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    Actions {
        correlation_id: Uuid,
        actions: Vec<Value>,
    },
    Update(Value),
}

/// Forwards everything onto a channel
#[derive(Debug, Clone)]
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<PresentationEvent>,
}

impl ChannelPresenter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PresentationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PresentationSink for ChannelPresenter {
    fn on_actions(&self, correlation_id: Uuid, actions: &[Value]) {
        let _ = self.tx.send(PresentationEvent::Actions {
            correlation_id,
            actions: actions.to_vec(),
        });
    }

    fn on_update(&self, payload: &Value) {
        let _ = self.tx.send(PresentationEvent::Update(payload.clone()));
    }
}
