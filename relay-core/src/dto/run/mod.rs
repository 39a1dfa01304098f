//! Run DTOs
//!
//! Bodies of the run submission and listing endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::outcome::Classification;
use crate::domain::run::{Run, RunSource, RunState};

/// Request to start a new run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRun {
    /// Free-form description of the DevOps goal
    pub text: String,

    /// Where the text came from
    #[serde(default)]
    pub source: RunSource,

    /// Originating ticket, if any
    #[serde(default)]
    pub ticket_key: Option<String>,
}

/// Identifier and state returned by submit and cancel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub state: RunState,
}

/// Which slice of runs to list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunView {
    #[default]
    All,
    Active,
    History,
}

impl RunView {
    pub fn includes(&self, state: RunState) -> bool {
        match self {
            RunView::All => true,
            RunView::Active => !state.is_terminal(),
            RunView::History => state.is_terminal(),
        }
    }
}

/// Query parameters of `GET /runs`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default)]
    pub view: RunView,
}

/// Condensed run information for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunListing {
    pub id: Uuid,
    pub source: RunSource,
    pub state: RunState,
    pub ticket_key: Option<String>,
    pub task_count: usize,
    pub result_count: usize,
    pub classification: Option<Classification>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Run> for RunListing {
    fn from(run: &Run) -> Self {
        RunListing {
            id: run.id,
            source: run.source,
            state: run.state,
            ticket_key: run.ticket_key.clone(),
            task_count: run.tasks.len(),
            result_count: run.results.len(),
            classification: run.outcome.as_ref().and_then(|o| o.classification()),
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}
