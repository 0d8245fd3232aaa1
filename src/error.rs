//! Error types shared across the voice session components

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failures on the backend link. These are absorbed by the transport's
/// reconnect policy and never reach the session state machine directly.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Connect attempt timed out after {0} ms")]
    AttemptTimedOut(u64),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Link closed")]
    Closed,
}

/// Failures reported by the speech capture adapter
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Speech recognition is not supported on this platform")]
    Unsupported,

    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Microphone permission revoked")]
    PermissionRevoked,

    #[error("Recognizer error: {0}")]
    Platform(String),
}

/// Structured reason published with the `error` state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorReason {
    CaptureUnsupported,
    PermissionDenied,
    PermissionRevoked,
    Capture { message: String },
    TransportFailed,
    ResponseTimeout { correlation_id: Uuid, retryable: bool },
    CommandLost { correlation_id: Uuid },
}

impl From<CaptureError> for ErrorReason {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Unsupported => ErrorReason::CaptureUnsupported,
            CaptureError::PermissionDenied => ErrorReason::PermissionDenied,
            CaptureError::PermissionRevoked => ErrorReason::PermissionRevoked,
            CaptureError::Platform(message) => ErrorReason::Capture { message },
        }
    }
}

/// Inbound frames the client cannot interpret. Logged and ignored.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Frame of type {0:?} carries no usable correlation id")]
    MissingCorrelation(Option<String>),
}
