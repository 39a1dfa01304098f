//! Ticket Intake API Handlers
//!
//! Runs started from the ticket system, either pushed by its webhook or
//! pulled on demand by issue key.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use relay_core::dto::run::RunHandle;
use relay_core::dto::webhook::JiraWebhook;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /webhook/jira
/// Submit the description of a DevOps ticket
pub async fn jira_webhook(
    State(orchestrator): State<AppState>,
    Json(payload): Json<JiraWebhook>,
) -> ApiResult<(StatusCode, Json<RunHandle>)> {
    let handle = orchestrator.submit_webhook(payload).inspect_err(|e| {
        tracing::warn!("Webhook rejected: {}", e);
    })?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

/// POST /tickets/{key}/submit
/// Fetch a ticket's description and submit it
pub async fn submit_ticket(
    State(orchestrator): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<(StatusCode, Json<RunHandle>)> {
    tracing::info!("Submitting ticket {}", key);
    let handle = orchestrator.submit_ticket(&key).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}
