//! Task result and error taxonomy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::task::DeclaredKind;

/// Terminal status of one dispatched task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failure,
    Timeout,
}

impl TaskStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failure => write!(f, "failure"),
            TaskStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Classified error kinds
///
/// `ValidationError`, `ExtractionError`, `ExtractionTimeout` and `Cancelled`
/// are fatal to a run. Everything else is task-local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    ExtractionError,
    ExtractionTimeout,
    UnknownKind,
    InvalidParameters,
    ExecutorUnavailable,
    ExecutorFailure,
    ExecutorTimeout,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::ExtractionError => "extraction_error",
            ErrorKind::ExtractionTimeout => "extraction_timeout",
            ErrorKind::UnknownKind => "unknown_kind",
            ErrorKind::InvalidParameters => "invalid_parameters",
            ErrorKind::ExecutorUnavailable => "executor_unavailable",
            ErrorKind::ExecutorFailure => "executor_failure",
            ErrorKind::ExecutorTimeout => "executor_timeout",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether this kind aborts the whole run rather than a single task
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::ValidationError
                | ErrorKind::ExtractionError
                | ErrorKind::ExtractionTimeout
                | ErrorKind::Cancelled
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind and message of a classified failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Terminal outcome of dispatching one task descriptor
///
/// Immutable once recorded; a task id has exactly one result per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub kind: DeclaredKind,
    pub status: TaskStatus,
    pub payload: Option<serde_json::Value>,
    pub error: Option<FailureDetail>,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(
        task_id: impl Into<String>,
        kind: DeclaredKind,
        payload: serde_json::Value,
        duration_ms: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            status: TaskStatus::Success,
            payload: Some(payload),
            error: None,
            duration_ms,
            recorded_at: Utc::now(),
        }
    }

    /// A failed result; `ExecutorTimeout` maps to the `timeout` status
    pub fn failed(
        task_id: impl Into<String>,
        kind: DeclaredKind,
        error: FailureDetail,
        duration_ms: u64,
    ) -> Self {
        let status = if error.kind == ErrorKind::ExecutorTimeout {
            TaskStatus::Timeout
        } else {
            TaskStatus::Failure
        };

        Self {
            task_id: task_id.into(),
            kind,
            status,
            payload: None,
            error: Some(error),
            duration_ms,
            recorded_at: Utc::now(),
        }
    }
}
