//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod event;
pub mod executor;
pub mod health;
pub mod run;
pub mod ticket;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::Orchestrator;

/// Shared handler state
pub type AppState = Arc<Orchestrator>;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Run endpoints
        .route("/runs", post(run::submit_run).get(run::list_runs))
        .route("/runs/{id}", get(run::get_run))
        .route("/runs/{id}/results", get(run::get_results))
        .route("/runs/{id}/outcome", get(run::get_outcome))
        .route("/runs/{id}/events", get(run::get_run_events))
        .route("/runs/{id}/cancel", post(run::cancel_run))
        // Event log endpoints
        .route("/events", get(event::list_events))
        .route("/events/clear", post(event::clear_events))
        // Executor endpoints
        .route("/executors", get(executor::list_executors))
        // Ticket intake
        .route("/webhook/jira", post(ticket::jira_webhook))
        .route("/tickets/{key}/submit", post(ticket::submit_ticket))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
