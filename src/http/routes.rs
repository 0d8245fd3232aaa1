use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Observable state
        .route("/voice/state", get(handlers::get_state))
        // Session control
        .route("/voice/start", post(handlers::start))
        .route("/voice/stop", post(handlers::stop))
        .route("/voice/end", post(handlers::end))
        .route("/voice/retry", post(handlers::retry))
        .route("/voice/acknowledge", post(handlers::acknowledge))
        .route("/voice/mute", post(handlers::set_muted))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
