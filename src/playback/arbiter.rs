use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::sink::{AudioPlayer, SpeechSynthesizer};
use crate::transport::ResponseMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSource {
    Speech,
    RemoteAudio,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing { source: PlaybackSource },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackContent {
    Speech(String),
    RemoteAudio(String),
}

impl PlaybackContent {
    /// Pick what to play for a reply. Remote audio wins over synthesized
    /// speech; `None` when there is nothing speakable.
    pub fn from_response(response: &ResponseMessage) -> Option<Self> {
        if let Some(audio) = response.audio() {
            return Some(PlaybackContent::RemoteAudio(audio.to_string()));
        }
        let text = response.text.trim();
        if text.is_empty() {
            None
        } else {
            Some(PlaybackContent::Speech(text.to_string()))
        }
    }

    pub fn source(&self) -> PlaybackSource {
        match self {
            PlaybackContent::Speech(_) => PlaybackSource::Speech,
            PlaybackContent::RemoteAudio(_) => PlaybackSource::RemoteAudio,
        }
    }
}

/// Completion report for one playback
#[derive(Debug, Clone)]
pub struct PlaybackFinished {
    pub id: u64,
    pub source: PlaybackSource,
    /// Sink error text, if the sink failed
    pub error: Option<String>,
}

struct ActivePlayback {
    id: u64,
    source: PlaybackSource,
    task: JoinHandle<()>,
}

/// Single-slot playback arbiter
///
/// At most one playback is active. Starting a new one cancels and awaits the
/// previous one first, so two never overlap.
pub struct ResponsePlayback {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    done_tx: mpsc::UnboundedSender<PlaybackFinished>,
    active: Option<ActivePlayback>,
    next_id: u64,
}

impl ResponsePlayback {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn AudioPlayer>,
        done_tx: mpsc::UnboundedSender<PlaybackFinished>,
    ) -> Self {
        Self {
            synthesizer,
            player,
            done_tx,
            active: None,
            next_id: 0,
        }
    }

    pub async fn start(&mut self, content: PlaybackContent) -> u64 {
        self.stop().await;

        self.next_id += 1;
        let id = self.next_id;
        let source = content.source();
        let synthesizer = Arc::clone(&self.synthesizer);
        let player = Arc::clone(&self.player);
        let done_tx = self.done_tx.clone();

        let task = tokio::spawn(async move {
            let result = match &content {
                PlaybackContent::Speech(text) => synthesizer.speak(text).await,
                PlaybackContent::RemoteAudio(audio_ref) => player.play(audio_ref).await,
            };
            let _ = done_tx.send(PlaybackFinished {
                id,
                source,
                error: result.err().map(|e| format!("{:#}", e)),
            });
        });

        info!("Playback {} started ({:?})", id, source);
        self.active = Some(ActivePlayback { id, source, task });
        id
    }

    /// Cancel the active playback, if any, and wait for it to wind down
    pub async fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
            let _ = active.task.await;
            debug!("Playback {} cancelled", active.id);
        }
    }

    /// Whether `id` is the playback currently active
    pub fn is_current(&self, id: u64) -> bool {
        self.active.as_ref().map(|a| a.id == id).unwrap_or(false)
    }

    /// Clear the slot after the active playback reported completion
    pub fn finish(&mut self, id: u64) -> bool {
        if self.is_current(id) {
            self.active = None;
            true
        } else {
            false
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        match &self.active {
            Some(active) => PlaybackStatus::Playing {
                source: active.source,
            },
            None => PlaybackStatus::Idle,
        }
    }
}
