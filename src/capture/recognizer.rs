use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::CaptureError;

/// Microphone permission as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not decided yet; the user can still be asked
    Prompt,
}

/// Raw event from a platform speech-to-text engine
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Recognition result. Confidence is whatever the vendor reports and may
    /// fall outside `0.0..=1.0`.
    Result {
        text: String,
        confidence: f32,
        is_final: bool,
    },
    /// The vendor stopped listening after its own silence window
    SilenceTimeout,
    /// Capture ended normally
    End,
    /// Microphone access was withdrawn mid-capture
    PermissionRevoked,
    Error(String),
}

/// Continuous speech-to-text capability handle
///
/// Injected into [`super::SpeechCaptureEngine`] so the session manager can run
/// without a real microphone.
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send {
    /// Whether the platform offers speech recognition at all
    fn is_supported(&self) -> bool;

    /// Current microphone permission
    async fn permission(&self) -> PermissionState;

    /// Ask the user for microphone access. Defaults to reporting the current state.
    async fn request_permission(&mut self) -> PermissionState {
        self.permission().await
    }

    /// Begin continuous recognition
    ///
    /// Returns a channel receiver that will receive recognition events
    async fn start(&mut self) -> Result<mpsc::Receiver<RecognizerEvent>, CaptureError>;

    /// Stop recognition. Must be safe to call when not started.
    async fn stop(&mut self);

    /// Get recognizer name for logging
    fn name(&self) -> &str;
}
