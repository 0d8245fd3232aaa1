//! Externally observable session state
//!
//! The store is split in two halves: a single [`StoreWriter`] owned by the
//! session manager, and any number of cloneable [`StoreReader`]s. Every
//! update replaces the whole snapshot at once, so readers never observe a
//! half-applied transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::capture::TranscriptEvent;
use crate::error::ErrorReason;
use crate::playback::PlaybackStatus;
use crate::session::{SessionSummary, VoiceState};
use crate::transport::ConnectionState;

/// Last reply delivered in the current or previous session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyView {
    pub correlation_id: Uuid,
    pub text: String,
    pub audio_ref: Option<String>,
    pub actions: Vec<Value>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: VoiceState,
    pub session_id: Option<Uuid>,
    pub transcript: Option<TranscriptEvent>,
    /// Confidence of the latest transcript
    pub confidence: Option<f32>,
    pub connection: ConnectionState,
    pub playback: PlaybackStatus,
    pub error: Option<ErrorReason>,
    /// Correlation id of the command awaiting its reply
    pub pending_command: Option<Uuid>,
    pub last_reply: Option<ReplyView>,
    pub last_session: Option<SessionSummary>,
    /// Commands that were never answered, across all sessions
    pub lost_commands: u64,
    pub continuous: bool,
    pub muted: bool,
    /// Advisory microphone level (visual feedback only)
    pub audio_level: f32,
}

pub struct SessionStateStore;

impl SessionStateStore {
    pub fn new(initial: SessionSnapshot) -> (StoreWriter, StoreReader) {
        let (tx, rx) = watch::channel(initial);
        (StoreWriter { tx }, StoreReader { rx })
    }
}

/// Sole write handle. Deliberately not `Clone`.
#[derive(Debug)]
pub struct StoreWriter {
    tx: watch::Sender<SessionSnapshot>,
}

impl StoreWriter {
    /// Apply `f` to the snapshot and publish the result in one step.
    /// Observers are only woken if something changed.
    pub fn update(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        self.tx.send_if_modified(|snapshot| {
            let before = snapshot.clone();
            f(snapshot);
            *snapshot != before
        });
    }

    pub fn reader(&self) -> StoreReader {
        StoreReader {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreReader {
    rx: watch::Receiver<SessionSnapshot>,
}

impl StoreReader {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next published snapshot. `None` once the writer is gone.
    pub async fn changed(&mut self) -> Option<SessionSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until `predicate` holds, returning the matching snapshot
    pub async fn wait_for(
        &mut self,
        predicate: impl Fn(&SessionSnapshot) -> bool,
    ) -> Option<SessionSnapshot> {
        let snapshot = self.rx.wait_for(|s| predicate(s)).await.ok()?;
        Some(snapshot.clone())
    }
}
