//! Health Check API Handler
//!
//! Liveness of the orchestrator process itself. Executor health lives under
//! `/executors`.

use axum::{http::StatusCode, response::IntoResponse};

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
