//! HTTP API for local control of the voice session
//!
//! - GET /health - Health check
//! - GET /voice/state - Current session snapshot
//! - POST /voice/start | stop | end | retry | acknowledge - Session controls
//! - POST /voice/mute - Mute or unmute reply playback

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
