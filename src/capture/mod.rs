//! Speech capture
//!
//! This module provides the adapter between a platform speech-to-text engine
//! and the session manager:
//! - `SpeechRecognizer`: injected capability handle (support, permission, start/stop)
//! - `SpeechCaptureEngine`: idempotent start/stop, confidence clamping, run tagging
//! - `LineRecognizer`: terminal-driven recognizer for the demo client

mod engine;
mod lines;
mod recognizer;

pub use engine::{clamp_confidence, CaptureEnvelope, CaptureEvent, SpeechCaptureEngine, TranscriptEvent};
pub use lines::LineRecognizer;
pub use recognizer::{PermissionState, RecognizerEvent, SpeechRecognizer};
