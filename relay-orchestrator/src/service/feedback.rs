//! Feedback Sink
//!
//! Delivers a terminal run's outcome to whoever asked for it. Delivery is
//! decoupled from the run: outcomes are queued and a detached worker drains
//! the queue, so a slow ticket system never holds up run completion and a
//! failed delivery never touches run state.

use async_trait::async_trait;
use relay_core::domain::event::{Event, EventType, NewEvent, Service};
use relay_core::domain::outcome::RunOutcome;
use relay_core::domain::result::TaskStatus;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::repository::EventRecorder;
use crate::service::jira::JiraClient;

/// Feedback error type
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("ticket request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("ticket system returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("no '{0}' transition available")]
    MissingTransition(String),

    #[error("ticket {0} has no description")]
    NoDescription(String),

    #[error("feedback queue is full")]
    QueueFull,

    #[error("feedback worker has stopped")]
    QueueClosed,
}

/// Everything a sink gets for one run
#[derive(Debug, Clone)]
pub struct FeedbackReport {
    pub run_id: Uuid,
    pub ticket_key: Option<String>,
    pub outcome: RunOutcome,
    /// The run's events at the time it became terminal
    pub events: Vec<Event>,
}

/// Destination for run outcomes
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn report(&self, report: &FeedbackReport) -> Result<(), FeedbackError>;
}

/// Human-readable report of an outcome
pub fn render_report(outcome: &RunOutcome) -> String {
    let mut out = String::new();

    match outcome {
        RunOutcome::Completed { summary, .. } => {
            let failed = summary.failed + summary.timed_out;
            let _ = writeln!(out, "Processed {} tasks:", summary.total);
            let _ = writeln!(out, "- {} tasks completed successfully", summary.succeeded);
            let _ = writeln!(out, "- {} tasks failed", failed);

            if summary.tasks.is_empty() {
                let _ = writeln!(out, "\nNo actionable DevOps tasks were found.");
            }

            if failed > 0 {
                let _ = writeln!(out, "\nFailed tasks:");
                for task in summary.tasks.iter().filter(|t| !t.status.is_success()) {
                    let label = if task.description.is_empty() {
                        task.kind.to_string()
                    } else {
                        format!("{} ({})", task.description, task.kind)
                    };
                    let reason = match (&task.error, task.status) {
                        (Some(error), _) => error.to_string(),
                        (None, TaskStatus::Timeout) => "timed out".to_string(),
                        (None, _) => "unknown error".to_string(),
                    };
                    let _ = writeln!(out, "- Task: {}\n  Error: {}", label, reason);
                }
            }

            let _ = write!(out, "\nResult: {}", summary.classification);
        }
        RunOutcome::Failed { error, .. } => {
            let _ = writeln!(out, "Request could not be processed.");
            let _ = writeln!(out, "- Error kind: {}", error.kind);
            let _ = write!(out, "- Message: {}", error.message);
        }
    }

    out
}

/// Writes reports to the log only
pub struct LogFeedbackSink;

#[async_trait]
impl FeedbackSink for LogFeedbackSink {
    async fn report(&self, report: &FeedbackReport) -> Result<(), FeedbackError> {
        info!(
            "Run {} finished ({} events):\n{}",
            report.run_id,
            report.events.len(),
            render_report(&report.outcome)
        );
        Ok(())
    }
}

/// Comments on the originating ticket and moves it to Done or Failed
pub struct JiraFeedbackSink {
    jira: JiraClient,
}

impl JiraFeedbackSink {
    pub fn new(jira: JiraClient) -> Self {
        Self { jira }
    }
}

#[async_trait]
impl FeedbackSink for JiraFeedbackSink {
    async fn report(&self, report: &FeedbackReport) -> Result<(), FeedbackError> {
        let Some(key) = report.ticket_key.as_deref() else {
            debug!("Run {} has no ticket, logging only", report.run_id);
            return LogFeedbackSink.report(report).await;
        };

        self.jira
            .add_comment(key, &render_report(&report.outcome))
            .await?;

        let status = if report.outcome.is_clean() {
            "Done"
        } else {
            "Failed"
        };
        self.jira.transition(key, status).await?;

        info!("Ticket {} updated for run {} ({})", key, report.run_id, status);
        Ok(())
    }
}

/// Bounded queue in front of a sink, drained by one detached worker
#[derive(Clone)]
pub struct FeedbackQueue {
    tx: mpsc::Sender<FeedbackReport>,
    events: Arc<EventRecorder>,
}

impl FeedbackQueue {
    /// Start the worker
    pub fn spawn(
        sink: Arc<dyn FeedbackSink>,
        events: Arc<EventRecorder>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<FeedbackReport>(capacity.max(1));
        let worker_events = events.clone();

        let handle = tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                if let Err(e) = sink.report(&report).await {
                    error!("Feedback for run {} failed: {}", report.run_id, e);
                    record_failure(&worker_events, report.run_id, &e);
                }
            }
            debug!("Feedback worker stopped");
        });

        (Self { tx, events }, handle)
    }

    /// Queue a report without waiting
    ///
    /// On overflow the report is dropped and the failure recorded.
    pub fn enqueue(&self, report: FeedbackReport) -> Result<(), FeedbackError> {
        let run_id = report.run_id;
        let err = match self.tx.try_send(report) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => FeedbackError::QueueFull,
            Err(mpsc::error::TrySendError::Closed(_)) => FeedbackError::QueueClosed,
        };

        warn!("Dropping feedback for run {}: {}", run_id, err);
        record_failure(&self.events, run_id, &err);
        Err(err)
    }
}

fn record_failure(events: &EventRecorder, run_id: Uuid, err: &FeedbackError) {
    events.record(
        NewEvent::new(
            Service::Feedback,
            EventType::FeedbackFailed,
            format!("Feedback delivery failed for run {}", run_id),
        )
        .with_data(json!({ "run_id": run_id, "error": err.to_string() })),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::domain::outcome::{Classification, RunSummary, TaskSummary};
    use relay_core::domain::result::{ErrorKind, FailureDetail};
    use relay_core::domain::task::TaskKind;
    use relay_core::dto::event::EventQuery;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn partial_outcome() -> RunOutcome {
        let task = |index: usize, status: TaskStatus, error: Option<FailureDetail>| TaskSummary {
            task_id: format!("task-{}", index + 1),
            sequence_index: index,
            kind: TaskKind::Deploy.into(),
            description: format!("deploy step {}", index),
            status,
            payload: None,
            error,
            duration_ms: 1,
        };

        RunOutcome::Completed {
            run_id: Uuid::nil(),
            summary: RunSummary {
                classification: Classification::PartialFailure,
                total: 2,
                succeeded: 1,
                failed: 0,
                timed_out: 1,
                tasks: vec![
                    task(0, TaskStatus::Success, None),
                    task(
                        1,
                        TaskStatus::Timeout,
                        Some(FailureDetail::new(ErrorKind::ExecutorTimeout, "no answer")),
                    ),
                ],
                kinds: vec![],
            },
        }
    }

    fn report(outcome: RunOutcome) -> FeedbackReport {
        FeedbackReport {
            run_id: outcome.run_id(),
            ticket_key: None,
            outcome,
            events: vec![],
        }
    }

    #[test]
    fn test_render_completed() {
        let text = render_report(&partial_outcome());
        assert!(text.starts_with("Processed 2 tasks:"));
        assert!(text.contains("- 1 tasks completed successfully"));
        assert!(text.contains("- 1 tasks failed"));
        assert!(text.contains("deploy step 1 (deploy)"));
        assert!(text.contains("executor_timeout: no answer"));
        assert!(!text.contains("deploy step 0"));
        assert!(text.ends_with("Result: partial_failure"));
    }

    #[test]
    fn test_render_failed() {
        let outcome = RunOutcome::Failed {
            run_id: Uuid::nil(),
            error: FailureDetail::new(ErrorKind::ExtractionTimeout, "timed out after 30s"),
        };
        let text = render_report(&outcome);
        assert!(text.contains("extraction_timeout"));
        assert!(text.contains("timed out after 30s"));
    }

    struct FailingSink;

    #[async_trait]
    impl FeedbackSink for FailingSink {
        async fn report(&self, _report: &FeedbackReport) -> Result<(), FeedbackError> {
            Err(FeedbackError::MissingTransition("Done".to_string()))
        }
    }

    #[tokio::test]
    async fn test_worker_records_delivery_failure() {
        let events = Arc::new(EventRecorder::new(10));
        let (queue, _worker) = FeedbackQueue::spawn(Arc::new(FailingSink), events.clone(), 4);

        queue.enqueue(report(partial_outcome())).unwrap();

        let mut recorded = Vec::new();
        for _ in 0..50 {
            recorded = events.query(&EventQuery::default());
            if !recorded.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_type, EventType::FeedbackFailed);
        assert_eq!(recorded[0].run_id, None);
        assert_eq!(recorded[0].data["run_id"], json!(Uuid::nil()));
    }

    /// Blocks until released, remembering what it saw
    struct GatedSink {
        gate: Notify,
        seen: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl FeedbackSink for GatedSink {
        async fn report(&self, report: &FeedbackReport) -> Result<(), FeedbackError> {
            self.gate.notified().await;
            self.seen.lock().unwrap().push(report.run_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_overflow_never_blocks() {
        let sink = Arc::new(GatedSink {
            gate: Notify::new(),
            seen: Mutex::new(Vec::new()),
        });
        let events = Arc::new(EventRecorder::new(10));
        let (queue, _worker) = FeedbackQueue::spawn(sink.clone(), events.clone(), 1);

        // One report held by the worker, one queued, the rest overflow
        let mut rejected = 0;
        for _ in 0..4 {
            if queue.enqueue(report(partial_outcome())).is_err() {
                rejected += 1;
            }
            tokio::task::yield_now().await;
        }

        assert!(rejected >= 2);
        assert_eq!(events.query(&EventQuery::default()).len(), rejected);
        sink.gate.notify_waiters();
    }
}
