use axum::extract::State;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use super::AppState;

/// Health check endpoint
/// Returns 200 OK if the service is running
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "logboard",
            "version": env!("CARGO_PKG_VERSION"),
            "active_streams": state.sessions.active_sessions(),
            "streams": state.sessions.session_summaries(),
        })),
    )
}
