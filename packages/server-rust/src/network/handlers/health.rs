//! Health, liveness, and readiness endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::RuntimeState;

/// Detailed health as JSON. Always 200; `state` carries the lifecycle phase.
pub async fn health_handler(State(runtime): State<Arc<RuntimeState>>) -> Json<serde_json::Value> {
    Json(json!({
        "service": runtime.service,
        "state": runtime.shutdown.state().as_str(),
        "in_flight": runtime.shutdown.in_flight(),
        "uptime_secs": runtime.started_at.elapsed().as_secs(),
    }))
}

/// Liveness: the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness: 200 only while `Ready`.
pub async fn readiness_handler(State(runtime): State<Arc<RuntimeState>>) -> StatusCode {
    if runtime.shutdown.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
