use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::http;
use crate::state::AppState;
use crate::ws::ws_handler;

/// Comfortably above `tutor_exec::MAX_CODE_BYTES` plus JSON envelope
/// overhead; a body past this never reaches a handler, it gets a 413
/// straight from the body-limit layer.
const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/healthz", get(http::healthz))
        .route("/api/auth/status", get(http::auth_status))
        .route("/api/login", post(http::login))
        .route("/api/problems", get(http::list_problems))
        .route("/api/problems/{id}", get(http::get_problem))
        .route("/api/run", post(http::run_code))
        .route("/api/submit", post(http::submit_code))
        .route("/api/sessions", get(http::list_sessions))
        .route("/api/sessions/latest-resumable", get(http::latest_resumable))
        .route("/api/sessions/{id}", get(http::get_session))
        .route("/api/sessions/{id}", delete(http::delete_session))
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
