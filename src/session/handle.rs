use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::store::{SessionSnapshot, StoreReader};

/// User-level requests to the session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Start,
    /// Finish the current activity (listening or speaking) and go idle
    Stop,
    /// End the session from any state
    End,
    Retry,
    Acknowledge,
    SetMuted(bool),
    SetContinuous(bool),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Voice session loop has stopped")]
pub struct SessionClosed;

/// Cloneable front door to a running [`super::VoiceSessionManager`]
#[derive(Debug, Clone)]
pub struct SessionHandle {
    control: mpsc::UnboundedSender<Control>,
    store: StoreReader,
}

impl SessionHandle {
    pub(crate) fn new(control: mpsc::UnboundedSender<Control>, store: StoreReader) -> Self {
        Self { control, store }
    }

    pub fn send(&self, control: Control) -> Result<(), SessionClosed> {
        self.control.send(control).map_err(|_| SessionClosed)
    }

    pub fn start(&self) -> Result<(), SessionClosed> {
        self.send(Control::Start)
    }

    pub fn stop(&self) -> Result<(), SessionClosed> {
        self.send(Control::Stop)
    }

    pub fn end(&self) -> Result<(), SessionClosed> {
        self.send(Control::End)
    }

    pub fn retry(&self) -> Result<(), SessionClosed> {
        self.send(Control::Retry)
    }

    pub fn acknowledge(&self) -> Result<(), SessionClosed> {
        self.send(Control::Acknowledge)
    }

    pub fn set_muted(&self, muted: bool) -> Result<(), SessionClosed> {
        self.send(Control::SetMuted(muted))
    }

    pub fn set_continuous(&self, continuous: bool) -> Result<(), SessionClosed> {
        self.send(Control::SetContinuous(continuous))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> StoreReader {
        self.store.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }
}
