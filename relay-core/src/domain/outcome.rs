//! Run outcome types
//!
//! The aggregated, render-ready view of a terminal run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{FailureDetail, TaskStatus};
use crate::domain::task::DeclaredKind;

/// Overall classification of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    CompletedAll,
    PartialFailure,
    FailedAll,
    NoActionableTasks,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Classification::CompletedAll => "completed_all",
            Classification::PartialFailure => "partial_failure",
            Classification::FailedAll => "failed_all",
            Classification::NoActionableTasks => "no_actionable_tasks",
        };
        f.write_str(label)
    }
}

/// One line of the summary, in `sequence_index` order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub sequence_index: usize,
    pub kind: DeclaredKind,
    pub description: String,
    pub status: TaskStatus,
    pub payload: Option<serde_json::Value>,
    pub error: Option<FailureDetail>,
    pub duration_ms: u64,
}

/// Per-kind status counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSummary {
    pub kind: DeclaredKind,
    pub statuses: Vec<TaskStatus>,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

/// Summary payload of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub classification: Classification,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub tasks: Vec<TaskSummary>,
    pub kinds: Vec<KindSummary>,
}

/// Aggregated outcome handed to the feedback sink
///
/// Failed runs carry the fatal error instead of a task summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { run_id: Uuid, summary: RunSummary },
    Failed { run_id: Uuid, error: FailureDetail },
}

impl RunOutcome {
    pub fn run_id(&self) -> Uuid {
        match self {
            RunOutcome::Completed { run_id, .. } | RunOutcome::Failed { run_id, .. } => *run_id,
        }
    }

    pub fn classification(&self) -> Option<Classification> {
        match self {
            RunOutcome::Completed { summary, .. } => Some(summary.classification),
            RunOutcome::Failed { .. } => None,
        }
    }

    /// Whether the originating ticket can be considered done
    pub fn is_clean(&self) -> bool {
        matches!(
            self.classification(),
            Some(Classification::CompletedAll | Classification::NoActionableTasks)
        )
    }
}
