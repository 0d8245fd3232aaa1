//! Voice session orchestration
//!
//! This module provides the `VoiceSessionManager`, which owns:
//! - The voice state machine (idle, listening, processing, speaking, error)
//! - Session lifecycle and per-session command history
//! - Correlation of backend replies to dispatched commands
//! - Response timeouts and retry of the last command
//! - The only write handle to the observable session state

mod config;
mod handle;
mod manager;
mod model;

pub use config::{SessionConfig, SessionDeps};
pub use handle::{Control, SessionClosed, SessionHandle};
pub use manager::VoiceSessionManager;
pub use model::{SessionSummary, VoiceSession, VoiceState};
