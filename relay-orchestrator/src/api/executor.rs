//! Executor API Handlers

use axum::{Json, extract::State};
use relay_core::domain::executor::ExecutorStatus;

use crate::api::AppState;

/// GET /executors
/// Health and load of every registered kind
pub async fn list_executors(State(orchestrator): State<AppState>) -> Json<Vec<ExecutorStatus>> {
    tracing::debug!("Listing executors");
    Json(orchestrator.executors())
}
