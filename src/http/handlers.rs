use super::state::AppState;
use crate::session::{Control, SessionClosed, VoiceState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    /// Control that was accepted, e.g. `"start"`
    pub status: String,

    /// State at the time the control was queued; the transition itself is
    /// applied asynchronously
    pub state: VoiceState,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Queue a control on the session loop and report the current state
fn submit(state: &AppState, control: Control, label: &str) -> Response {
    info!("HTTP control: {}", label);

    match state.session.send(control) {
        Ok(()) => (
            StatusCode::OK,
            Json(ControlResponse {
                status: label.to_string(),
                state: state.session.snapshot().status,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to submit {}: {}", label, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /voice/start
pub async fn start(State(state): State<AppState>) -> impl IntoResponse {
    submit(&state, Control::Start, "start")
}

/// POST /voice/stop
pub async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    submit(&state, Control::Stop, "stop")
}

/// POST /voice/end
pub async fn end(State(state): State<AppState>) -> impl IntoResponse {
    submit(&state, Control::End, "end")
}

/// POST /voice/retry
/// Retry after an error, resending the retained command if there is one
pub async fn retry(State(state): State<AppState>) -> impl IntoResponse {
    submit(&state, Control::Retry, "retry")
}

/// POST /voice/acknowledge
/// Dismiss an error and return to idle
pub async fn acknowledge(State(state): State<AppState>) -> impl IntoResponse {
    submit(&state, Control::Acknowledge, "acknowledge")
}

/// POST /voice/mute
pub async fn set_muted(
    State(state): State<AppState>,
    Json(req): Json<MuteRequest>,
) -> impl IntoResponse {
    let label = if req.muted { "muted" } else { "unmuted" };
    submit(&state, Control::SetMuted(req.muted), label)
}

/// GET /voice/state
/// Full observable session snapshot
pub async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    if state.session.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: SessionClosed.to_string(),
            }),
        )
            .into_response();
    }

    (StatusCode::OK, Json(state.session.snapshot())).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
