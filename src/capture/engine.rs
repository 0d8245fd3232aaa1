use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::recognizer::{PermissionState, RecognizerEvent, SpeechRecognizer};
use crate::error::CaptureError;

/// A single recognition result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    /// Clamped to `0.0..=1.0`
    pub confidence: f32,
    pub is_final: bool,
    /// Position within the current utterance, reset after each final result
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Transcript(TranscriptEvent),
    /// Capture stopped on its own (end of input or vendor silence timeout)
    Ended,
    Errored(CaptureError),
}

/// Capture event tagged with the run that produced it
#[derive(Debug, Clone)]
pub struct CaptureEnvelope {
    pub run: u64,
    pub event: CaptureEvent,
}

/// Adapter over a platform [`SpeechRecognizer`]
///
/// Normalizes vendor events into [`CaptureEvent`]s and tags them with a run
/// number, so events from a stopped run can be told apart from the current
/// one. `start` and `stop` are idempotent.
pub struct SpeechCaptureEngine {
    recognizer: Box<dyn SpeechRecognizer>,
    events_tx: mpsc::UnboundedSender<CaptureEnvelope>,
    run: u64,
    active: bool,
    forwarder: Option<JoinHandle<()>>,
}

impl SpeechCaptureEngine {
    pub fn new(
        recognizer: Box<dyn SpeechRecognizer>,
        events_tx: mpsc::UnboundedSender<CaptureEnvelope>,
    ) -> Self {
        Self {
            recognizer,
            events_tx,
            run: 0,
            active: false,
            forwarder: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_supported()
    }

    /// Resolve microphone permission, prompting once if undecided
    pub async fn ensure_permission(&mut self) -> PermissionState {
        match self.recognizer.permission().await {
            PermissionState::Prompt => self.recognizer.request_permission().await,
            state => state,
        }
    }

    /// Whether an envelope belongs to the run currently capturing
    pub fn is_current(&self, run: u64) -> bool {
        self.active && run == self.run
    }

    pub async fn start(&mut self) -> Result<u64, CaptureError> {
        if self.active {
            return Ok(self.run);
        }

        if let Some(stale) = self.forwarder.take() {
            stale.abort();
        }

        let raw = self.recognizer.start().await?;
        self.run += 1;
        self.active = true;

        let run = self.run;
        let events_tx = self.events_tx.clone();
        self.forwarder = Some(tokio::spawn(forward(run, raw, events_tx)));

        info!("Speech capture started on {} (run {})", self.recognizer.name(), run);
        Ok(run)
    }

    pub async fn stop(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
        if !self.active {
            return;
        }
        self.active = false;
        self.recognizer.stop().await;
        debug!("Speech capture stopped (run {})", self.run);
    }
}

/// Clamp vendor confidence into `0.0..=1.0`; NaN and negatives become 0
pub fn clamp_confidence(raw: f32) -> f32 {
    if raw.is_nan() || raw <= 0.0 {
        0.0
    } else {
        raw.min(1.0)
    }
}

async fn forward(
    run: u64,
    mut raw: mpsc::Receiver<RecognizerEvent>,
    events_tx: mpsc::UnboundedSender<CaptureEnvelope>,
) {
    let mut sequence = 0u32;

    let terminal = loop {
        let Some(event) = raw.recv().await else {
            break CaptureEvent::Ended;
        };

        match event {
            RecognizerEvent::Result {
                text,
                confidence,
                is_final,
            } => {
                let transcript = TranscriptEvent {
                    text,
                    confidence: clamp_confidence(confidence),
                    is_final,
                    sequence,
                };
                sequence = if is_final { 0 } else { sequence + 1 };

                let envelope = CaptureEnvelope {
                    run,
                    event: CaptureEvent::Transcript(transcript),
                };
                if events_tx.send(envelope).is_err() {
                    return;
                }
            }
            RecognizerEvent::SilenceTimeout | RecognizerEvent::End => break CaptureEvent::Ended,
            RecognizerEvent::PermissionRevoked => {
                break CaptureEvent::Errored(CaptureError::PermissionRevoked)
            }
            RecognizerEvent::Error(message) => {
                warn!("Recognizer error (run {}): {}", run, message);
                break CaptureEvent::Errored(CaptureError::Platform(message));
            }
        }
    };

    let _ = events_tx.send(CaptureEnvelope {
        run,
        event: terminal,
    });
}
