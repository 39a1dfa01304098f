//! Run API Handlers
//!
//! Submission, inspection and cancellation of runs.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use relay_core::domain::event::Event;
use relay_core::domain::outcome::RunOutcome;
use relay_core::domain::result::TaskResult;
use relay_core::domain::run::Run;
use relay_core::dto::run::{ListRunsQuery, RunHandle, RunListing, SubmitRun};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

// =============================================================================
// Submission & Control
// =============================================================================

/// POST /runs
/// Start a run for the given text. Returns before any work is done.
pub async fn submit_run(
    State(orchestrator): State<AppState>,
    Json(req): Json<SubmitRun>,
) -> (StatusCode, Json<RunHandle>) {
    tracing::info!("Run submitted ({} chars, {})", req.text.len(), req.source);
    let handle = orchestrator.submit(req);
    (StatusCode::ACCEPTED, Json(handle))
}

/// POST /runs/{id}/cancel
/// Cancel a non-terminal run
pub async fn cancel_run(
    State(orchestrator): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RunHandle>> {
    tracing::info!("Cancelling run {}", id);
    Ok(Json(orchestrator.cancel(id).await?))
}

// =============================================================================
// Run Queries
// =============================================================================

/// GET /runs
/// List runs, newest first
pub async fn list_runs(
    State(orchestrator): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Json<Vec<RunListing>> {
    tracing::debug!("Listing runs ({:?})", query.view);
    Json(orchestrator.list_runs(query.view))
}

/// GET /runs/{id}
/// Full run including descriptors and results
pub async fn get_run(
    State(orchestrator): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run {}", id);
    Ok(Json(orchestrator.get_run(id)?))
}

/// GET /runs/{id}/results
/// Results recorded so far, in task order
pub async fn get_results(
    State(orchestrator): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<TaskResult>>> {
    Ok(Json(orchestrator.results(id)?))
}

/// GET /runs/{id}/outcome
/// Outcome of a terminal run; 409 while the run is still going
pub async fn get_outcome(
    State(orchestrator): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RunOutcome>> {
    Ok(Json(orchestrator.outcome(id)?))
}

/// GET /runs/{id}/events
/// Events recorded for a run, oldest first
pub async fn get_run_events(
    State(orchestrator): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Event>>> {
    Ok(Json(orchestrator.run_events(id)?))
}
