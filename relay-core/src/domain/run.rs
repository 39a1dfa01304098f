//! Run domain types
//!
//! A run is one end-to-end orchestration attempt for a single input text.
//! It exclusively owns its task descriptors and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::outcome::RunOutcome;
use crate::domain::result::{FailureDetail, TaskResult};
use crate::domain::task::TaskDescriptor;

/// Where the input text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSource {
    Webhook,
    #[default]
    Manual,
    Simulated,
}

impl std::fmt::Display for RunSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunSource::Webhook => write!(f, "webhook"),
            RunSource::Manual => write!(f, "manual"),
            RunSource::Simulated => write!(f, "simulated"),
        }
    }
}

/// Run lifecycle state
///
/// `received → extracting → dispatched → aggregating → completed`, with
/// `failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Received,
    Extracting,
    Dispatched,
    Aggregating,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Received, Extracting) => true,
            (Extracting, Dispatched) => true,
            (Dispatched, Aggregating) => true,
            (Aggregating, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunState::Received => "received",
            RunState::Extracting => "extracting",
            RunState::Dispatched => "dispatched",
            RunState::Aggregating => "aggregating",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One invocation of the orchestrator for one input text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub source: RunSource,
    pub raw_input: String,
    /// Originating ticket, when the run came from the ticket system
    pub ticket_key: Option<String>,
    pub state: RunState,
    pub tasks: Vec<TaskDescriptor>,
    /// Keyed by task id, populated as executors respond
    pub results: HashMap<String, TaskResult>,
    /// Set when the run ends in `failed`
    pub error: Option<FailureDetail>,
    /// Set once the run is terminal
    pub outcome: Option<RunOutcome>,
}

impl Run {
    pub fn new(raw_input: String, source: RunSource, ticket_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            source,
            raw_input,
            ticket_key,
            state: RunState::Received,
            tasks: Vec::new(),
            results: HashMap::new(),
            error: None,
            outcome: None,
        }
    }

    /// Results ordered by the descriptors' `sequence_index`
    pub fn ordered_results(&self) -> Vec<&TaskResult> {
        let mut tasks: Vec<&TaskDescriptor> = self.tasks.iter().collect();
        tasks.sort_by_key(|t| t.sequence_index);
        tasks
            .into_iter()
            .filter_map(|t| self.results.get(&t.id))
            .collect()
    }
}
