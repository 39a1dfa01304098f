//! Event Log API Handlers

use axum::{
    Json,
    extract::{Query, State},
};
use relay_core::domain::event::Event;
use relay_core::dto::event::{ClearedEvents, EventQuery};

use crate::api::AppState;

/// GET /events
/// Slice of the event log. Filters: `since`, `run_id`, `limit`.
pub async fn list_events(
    State(orchestrator): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Json<Vec<Event>> {
    tracing::debug!("Querying events: {:?}", query);
    Json(orchestrator.events(&query))
}

/// POST /events/clear
/// Hide everything recorded so far from later queries
pub async fn clear_events(State(orchestrator): State<AppState>) -> Json<ClearedEvents> {
    let hidden = orchestrator.clear_events();
    Json(ClearedEvents { hidden })
}
