//! Event domain types
//!
//! Events are immutable audit records. Ordering is by timestamp, with the
//! recorder-assigned `sequence` as the tie-break.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Component that emitted an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Orchestrator,
    Extraction,
    Dispatch,
    Aggregator,
    Registry,
    Feedback,
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Service::Orchestrator => "orchestrator",
            Service::Extraction => "extraction",
            Service::Dispatch => "dispatch",
            Service::Aggregator => "aggregator",
            Service::Registry => "registry",
            Service::Feedback => "feedback",
        };
        f.write_str(label)
    }
}

/// Closed set of event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskReceived,
    StateChanged,
    ExtractionStarted,
    ExtractionCompleted,
    ExtractionFailed,
    ValidationRejected,
    TaskDispatched,
    TaskCompleted,
    TaskFailed,
    RunCompleted,
    RunFailed,
    ExecutorHealthChanged,
    FeedbackFailed,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EventType::TaskReceived => "task_received",
            EventType::StateChanged => "state_changed",
            EventType::ExtractionStarted => "extraction_started",
            EventType::ExtractionCompleted => "extraction_completed",
            EventType::ExtractionFailed => "extraction_failed",
            EventType::ValidationRejected => "validation_rejected",
            EventType::TaskDispatched => "task_dispatched",
            EventType::TaskCompleted => "task_completed",
            EventType::TaskFailed => "task_failed",
            EventType::RunCompleted => "run_completed",
            EventType::RunFailed => "run_failed",
            EventType::ExecutorHealthChanged => "executor_health_changed",
            EventType::FeedbackFailed => "feedback_failed",
        };
        f.write_str(label)
    }
}

/// A recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Insertion sequence assigned by the recorder
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    /// `None` for process-wide events
    pub run_id: Option<Uuid>,
    pub service: Service,
    pub event_type: EventType,
    pub description: String,
    pub data: serde_json::Value,
}

/// An event before the recorder stamps it
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub run_id: Option<Uuid>,
    pub service: Service,
    pub event_type: EventType,
    pub description: String,
    pub data: serde_json::Value,
}

impl NewEvent {
    pub fn new(service: Service, event_type: EventType, description: impl Into<String>) -> Self {
        Self {
            run_id: None,
            service,
            event_type,
            description: description.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn for_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
