//! Orchestrator Service
//!
//! Drives each run through its state machine:
//! `received → extracting → dispatched → aggregating → completed`, or to
//! `failed` from any non-terminal state. One spawned driver per run is the
//! only writer of that run's lifecycle, so its terminal event is always its
//! last one.

use relay_core::domain::event::{Event, EventType, NewEvent, Service};
use relay_core::domain::executor::ExecutorStatus;
use relay_core::domain::outcome::RunOutcome;
use relay_core::domain::result::{ErrorKind, FailureDetail, TaskResult};
use relay_core::domain::run::{Run, RunSource, RunState};
use relay_core::dto::event::EventQuery;
use relay_core::dto::run::{RunHandle, RunListing, RunView, SubmitRun};
use relay_core::dto::webhook::JiraWebhook;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::repository::{EventRecorder, RunStore, StoreError};
use crate::service::aggregate;
use crate::service::dispatch::{DispatchCoordinator, DispatchEnd};
use crate::service::executor::{ExecutorClient, HttpExecutorClient};
use crate::service::extraction::{ChatCompletionExtractor, ExtractionAdapter, Extractor};
use crate::service::feedback::{
    FeedbackError, FeedbackQueue, FeedbackReport, FeedbackSink, JiraFeedbackSink, LogFeedbackSink,
};
use crate::service::jira::JiraClient;
use crate::service::registry::{ExecutorRegistry, spawn_health_checks};
use crate::service::validation::{PassThrough, PreDispatchHook, RequiredParameters};

/// How long a cancel request waits for the run to settle
const CANCEL_SETTLE: Duration = Duration::from_secs(5);

/// Service error type
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("run {0} has not reached a terminal state")]
    NotFinished(Uuid),

    #[error("run {0} is already {1}")]
    AlreadyTerminal(Uuid, RunState),

    #[error("invalid webhook payload: {0}")]
    InvalidWebhook(String),

    #[error("ticket intake is not configured")]
    TicketsDisabled,

    #[error(transparent)]
    Ticket(#[from] FeedbackError),
}

/// External collaborators, replaceable in tests
pub struct Collaborators {
    pub extractor: Arc<dyn Extractor>,
    pub executors: Arc<dyn ExecutorClient>,
    pub feedback: Arc<dyn FeedbackSink>,
    pub hook: Arc<dyn PreDispatchHook>,
    pub jira: Option<JiraClient>,
}

impl Collaborators {
    /// HTTP-backed collaborators described by the configuration
    pub fn from_config(config: &Config) -> Self {
        let jira = config.jira.clone().map(JiraClient::new);

        let feedback: Arc<dyn FeedbackSink> = match &jira {
            Some(client) => Arc::new(JiraFeedbackSink::new(client.clone())),
            None => Arc::new(LogFeedbackSink),
        };

        let hook: Arc<dyn PreDispatchHook> = if config.task_validation {
            Arc::new(RequiredParameters)
        } else {
            Arc::new(PassThrough)
        };

        Self {
            extractor: Arc::new(ChatCompletionExtractor::new(config.extraction.clone())),
            executors: Arc::new(HttpExecutorClient::new()),
            feedback,
            hook,
            jira,
        }
    }
}

/// The Task Orchestration Engine
pub struct Orchestrator {
    store: Arc<RunStore>,
    events: Arc<EventRecorder>,
    registry: Arc<ExecutorRegistry>,
    executors: Arc<dyn ExecutorClient>,
    extraction: ExtractionAdapter,
    hook: Arc<dyn PreDispatchHook>,
    dispatch: DispatchCoordinator,
    feedback: FeedbackQueue,
    jira: Option<JiraClient>,
    run_deadline: Duration,
    cancels: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
}

impl Orchestrator {
    /// Build the engine and start its feedback worker
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &Config, collaborators: Collaborators) -> Arc<Self> {
        let store = Arc::new(RunStore::new());
        let events = Arc::new(EventRecorder::new(config.event_capacity));
        let registry = Arc::new(ExecutorRegistry::new(
            &config.executors,
            config.health_failure_threshold,
        ));

        let extraction = ExtractionAdapter::new(
            collaborators.extractor,
            config.extraction.timeout,
            events.clone(),
        );

        let dispatch = DispatchCoordinator::new(
            registry.clone(),
            collaborators.executors.clone(),
            config.global_max_in_flight,
            store.clone(),
            events.clone(),
        );

        let (feedback, _worker) = FeedbackQueue::spawn(
            collaborators.feedback,
            events.clone(),
            config.feedback_queue_size,
        );

        Arc::new(Self {
            store,
            events,
            registry,
            executors: collaborators.executors,
            extraction,
            hook: collaborators.hook,
            dispatch,
            feedback,
            jira: collaborators.jira,
            run_deadline: config.run_deadline,
            cancels: Mutex::new(HashMap::new()),
        })
    }

    /// Start checking executor health in the background
    pub fn start_health_checks(&self, interval: Duration) -> JoinHandle<()> {
        spawn_health_checks(
            self.registry.clone(),
            self.executors.clone(),
            self.events.clone(),
            interval,
        )
    }

    // =========================================================================
    // Inbound triggers
    // =========================================================================

    /// Accept text and start a run. Returns immediately.
    pub fn submit(self: &Arc<Self>, req: SubmitRun) -> RunHandle {
        let run = Run::new(req.text, req.source, req.ticket_key);
        let run_id = run.id;

        self.events.record(
            NewEvent::new(
                Service::Orchestrator,
                EventType::TaskReceived,
                format!("Received {} request", run.source),
            )
            .for_run(run_id)
            .with_data(json!({
                "source": run.source,
                "ticket_key": run.ticket_key,
                "input_length": run.raw_input.len(),
            })),
        );

        info!("Run {} received from {}", run_id, run.source);
        self.store.insert(run);

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.lock_cancels().insert(run_id, cancel_tx);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drive(run_id, cancel_rx).await;
            this.lock_cancels().remove(&run_id);
        });

        RunHandle {
            run_id,
            state: RunState::Received,
        }
    }

    /// Validate a ticket webhook and submit its description
    pub fn submit_webhook(self: &Arc<Self>, hook: JiraWebhook) -> Result<RunHandle, OrchestratorError> {
        let ticket = hook.validate().map_err(OrchestratorError::InvalidWebhook)?;
        info!("Webhook accepted for ticket {}", ticket.key);

        Ok(self.submit(SubmitRun {
            text: ticket.description,
            source: RunSource::Webhook,
            ticket_key: Some(ticket.key),
        }))
    }

    /// Fetch a ticket's description and submit it
    pub async fn submit_ticket(self: &Arc<Self>, key: &str) -> Result<RunHandle, OrchestratorError> {
        let jira = self.jira.as_ref().ok_or(OrchestratorError::TicketsDisabled)?;
        let description = jira.issue_description(key).await?;

        Ok(self.submit(SubmitRun {
            text: description,
            source: RunSource::Manual,
            ticket_key: Some(key.to_string()),
        }))
    }

    /// Ask a non-terminal run to stop and wait briefly for it to settle
    ///
    /// Results of calls still in flight are discarded.
    pub async fn cancel(&self, run_id: Uuid) -> Result<RunHandle, OrchestratorError> {
        let run = self.store.get(run_id)?;
        if run.state.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal(run_id, run.state));
        }

        if let Some(tx) = self.lock_cancels().get(&run_id) {
            tx.send_replace(true);
        }
        info!("Cancellation requested for run {}", run_id);

        let mut rx = self.store.subscribe(run_id)?;
        let settled = tokio::time::timeout(CANCEL_SETTLE, rx.wait_for(|s| s.is_terminal())).await;
        if settled.is_err() {
            warn!("Run {} did not settle within {:?}", run_id, CANCEL_SETTLE);
        }

        let state = self.store.get(run_id)?.state;
        Ok(RunHandle { run_id, state })
    }

    // =========================================================================
    // Query surface
    // =========================================================================

    pub fn get_run(&self, run_id: Uuid) -> Result<Run, OrchestratorError> {
        Ok(self.store.get(run_id)?)
    }

    pub fn list_runs(&self, view: RunView) -> Vec<RunListing> {
        self.store.list(view).iter().map(RunListing::from).collect()
    }

    /// Results recorded so far, in `sequence_index` order
    pub fn results(&self, run_id: Uuid) -> Result<Vec<TaskResult>, OrchestratorError> {
        let run = self.store.get(run_id)?;
        Ok(run.ordered_results().into_iter().cloned().collect())
    }

    /// Stored outcome of a terminal run
    pub fn outcome(&self, run_id: Uuid) -> Result<RunOutcome, OrchestratorError> {
        let run = self.store.get(run_id)?;
        run.outcome.ok_or(OrchestratorError::NotFinished(run_id))
    }

    pub fn events(&self, query: &EventQuery) -> Vec<Event> {
        self.events.query(query)
    }

    pub fn run_events(&self, run_id: Uuid) -> Result<Vec<Event>, OrchestratorError> {
        self.store.get(run_id)?;
        Ok(self.events.query(&EventQuery::for_run(run_id)))
    }

    pub fn clear_events(&self) -> usize {
        let hidden = self.events.clear();
        info!("Event log view cleared ({} events hidden)", hidden);
        hidden
    }

    pub fn executors(&self) -> Vec<ExecutorStatus> {
        self.registry.statuses()
    }

    /// Wait until a run is completed or failed
    pub async fn wait_for_terminal(&self, run_id: Uuid) -> Result<Run, OrchestratorError> {
        let mut rx = self.store.subscribe(run_id)?;
        // The store keeps the sender alive as long as the run exists
        let _ = rx.wait_for(|s| s.is_terminal()).await;
        Ok(self.store.get(run_id)?)
    }

    // =========================================================================
    // Run driver
    // =========================================================================

    async fn drive(&self, run_id: Uuid, cancel: watch::Receiver<bool>) {
        let text = match self.store.get(run_id) {
            Ok(run) => run.raw_input,
            Err(e) => {
                warn!("Run {} vanished before start: {}", run_id, e);
                return;
            }
        };

        if self.stop_if_cancelled(run_id, &cancel) || !self.advance(run_id, RunState::Extracting) {
            return;
        }

        let extracted = tokio::select! {
            biased;
            _ = cancelled(cancel.clone()) => {
                self.fail_cancelled(run_id);
                return;
            }
            extracted = self.extraction.extract(run_id, &text) => extracted,
        };

        let tasks = match extracted {
            Ok(tasks) => tasks,
            Err(e) => {
                self.fail(run_id, FailureDetail::new(e.kind(), e.to_string()));
                return;
            }
        };

        if let Err(e) = self.store.set_tasks(run_id, tasks.clone()) {
            warn!("Run {}: could not store tasks: {}", run_id, e);
            return;
        }

        let reviewed = tokio::select! {
            biased;
            _ = cancelled(cancel.clone()) => {
                self.fail_cancelled(run_id);
                return;
            }
            reviewed = self.hook.review(run_id, &tasks) => reviewed,
        };

        if let Err(rejection) = reviewed {
            self.events.record(
                NewEvent::new(
                    Service::Orchestrator,
                    EventType::ValidationRejected,
                    "Extracted tasks rejected before dispatch",
                )
                .for_run(run_id)
                .with_data(json!({ "message": rejection.0 })),
            );
            self.fail(
                run_id,
                FailureDetail::new(ErrorKind::ValidationError, rejection.0),
            );
            return;
        }

        if self.stop_if_cancelled(run_id, &cancel) || !self.advance(run_id, RunState::Dispatched) {
            return;
        }

        let end = self
            .dispatch
            .dispatch(run_id, tasks, self.run_deadline, cancel.clone())
            .await;
        self.conclude(run_id, end);
    }

    /// Aggregate once dispatch has ended
    ///
    /// A cancel that arrives after every result is recorded does not change
    /// the outcome.
    fn conclude(&self, run_id: Uuid, end: DispatchEnd) {
        match end {
            DispatchEnd::Cancelled => {
                self.fail_cancelled(run_id);
                return;
            }
            DispatchEnd::DeadlineExceeded => {
                warn!("Run {} hit its deadline; aggregating what arrived", run_id);
            }
            DispatchEnd::Completed => {}
        }

        if !self.advance(run_id, RunState::Aggregating) {
            return;
        }

        let run = match self.store.get(run_id) {
            Ok(run) => run,
            Err(e) => {
                warn!("Run {} vanished during aggregation: {}", run_id, e);
                return;
            }
        };

        let outcome = aggregate::aggregate(&run);
        let classification = outcome.classification();
        self.finish(run_id, outcome, || {
            NewEvent::new(
                Service::Aggregator,
                EventType::RunCompleted,
                format!(
                    "Run completed: {}",
                    classification.map(|c| c.to_string()).unwrap_or_default()
                ),
            )
            .with_data(json!({
                "state": RunState::Completed,
                "classification": classification,
                "task_count": run.tasks.len(),
            }))
        });
    }

    /// Fails the run if a cancel is pending
    fn stop_if_cancelled(&self, run_id: Uuid, cancel: &watch::Receiver<bool>) -> bool {
        if *cancel.borrow() {
            self.fail_cancelled(run_id);
            return true;
        }
        false
    }

    /// Non-terminal transition with its state event
    ///
    /// Returns false when the store refused the move.
    fn advance(&self, run_id: Uuid, next: RunState) -> bool {
        match self.store.transition(run_id, next) {
            Ok(from) => {
                debug!("Run {}: {} -> {}", run_id, from, next);
                self.events.record(
                    NewEvent::new(
                        Service::Orchestrator,
                        EventType::StateChanged,
                        format!("Run moved to {}", next),
                    )
                    .for_run(run_id)
                    .with_data(json!({ "from": from, "state": next })),
                );
                true
            }
            Err(e) => {
                warn!("Run {}: {}", run_id, e);
                false
            }
        }
    }

    fn fail_cancelled(&self, run_id: Uuid) {
        self.fail(
            run_id,
            FailureDetail::new(ErrorKind::Cancelled, "run cancelled by caller"),
        );
    }

    fn fail(&self, run_id: Uuid, error: FailureDetail) {
        warn!("Run {} failed: {}", run_id, error);
        let outcome = aggregate::failed(run_id, error.clone());

        self.finish(run_id, outcome, || {
            NewEvent::new(
                Service::Orchestrator,
                EventType::RunFailed,
                format!("Run failed: {}", error),
            )
            .with_data(json!({
                "state": RunState::Failed,
                "error_kind": error.kind,
                "message": error.message,
            }))
        });
    }

    /// Terminal transition, terminal event, then queued feedback
    fn finish(&self, run_id: Uuid, outcome: RunOutcome, event: impl FnOnce() -> NewEvent) {
        let run = match self.store.finish(run_id, outcome.clone()) {
            Ok(_) => self.store.get(run_id),
            Err(e) => {
                warn!("Run {}: {}", run_id, e);
                return;
            }
        };

        self.events.record(event().for_run(run_id));
        info!("Run {} finished", run_id);

        let ticket_key = run.ok().and_then(|r| r.ticket_key);
        let report = FeedbackReport {
            run_id,
            ticket_key,
            outcome,
            events: self.events.query(&EventQuery::for_run(run_id)),
        };
        // Overflow is logged and recorded by the queue
        let _ = self.feedback.enqueue(report);
    }

    fn lock_cancels(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, watch::Sender<bool>>> {
        self.cancels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Resolves once the flag is raised; never if the sender is gone
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::domain::outcome::Classification;
    use relay_core::domain::result::TaskStatus;
    use relay_core::domain::task::{TaskDescriptor, TaskKind};
    use relay_core::dto::executor::ExecutionRequest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::service::executor::ExecutorCallError;
    use crate::service::extraction::{ExtractedTask, ExtractionError};
    use crate::service::validation::Rejection;

    /// Answers by keyword in the input text
    struct KeywordExtractor {
        delay: Duration,
    }

    #[async_trait]
    impl Extractor for KeywordExtractor {
        async fn extract_once(&self, text: &str) -> Result<Vec<ExtractedTask>, ExtractionError> {
            tokio::time::sleep(self.delay).await;
            let mut tasks = Vec::new();
            if text.contains("CI") {
                tasks.push(ExtractedTask {
                    kind: "ci".to_string(),
                    description: "Set up CI".to_string(),
                    parameters: [
                        ("repository".to_string(), json!("R")),
                        ("branch".to_string(), json!("main")),
                    ]
                    .into_iter()
                    .collect(),
                });
            }
            if text.contains("deploy") {
                tasks.push(ExtractedTask {
                    kind: "deploy".to_string(),
                    description: "Deploy".to_string(),
                    parameters: [
                        ("repository".to_string(), json!("R")),
                        ("namespace".to_string(), json!("prod")),
                    ]
                    .into_iter()
                    .collect(),
                });
            }
            Ok(tasks)
        }
    }

    struct SlowDeploy {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ExecutorClient for SlowDeploy {
        async fn execute(
            &self,
            _base_url: &str,
            request: &ExecutionRequest,
        ) -> Result<serde_json::Value, ExecutorCallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.kind == TaskKind::Deploy {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(json!({ "status": "success", "branch": request.parameters["branch"] }))
        }

        async fn check_health(&self, _base_url: &str) -> bool {
            true
        }
    }

    struct RejectAll;

    #[async_trait]
    impl PreDispatchHook for RejectAll {
        async fn review(&self, _run_id: Uuid, _tasks: &[TaskDescriptor]) -> Result<(), Rejection> {
            Err(Rejection("needs a human".to_string()))
        }
    }

    fn engine(
        extraction_delay: Duration,
        hook: Arc<dyn PreDispatchHook>,
    ) -> (Arc<Orchestrator>, Arc<SlowDeploy>) {
        let mut config = Config::default();
        config.extraction.timeout = Duration::from_secs(5);
        for exec in config.executors.values_mut() {
            exec.timeout = Duration::from_secs(10);
        }

        let executors = Arc::new(SlowDeploy {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(
            &config,
            Collaborators {
                extractor: Arc::new(KeywordExtractor {
                    delay: extraction_delay,
                }),
                executors: executors.clone(),
                feedback: Arc::new(LogFeedbackSink),
                hook,
                jira: None,
            },
        );
        (orchestrator, executors)
    }

    fn submit(orchestrator: &Arc<Orchestrator>, text: &str) -> Uuid {
        orchestrator
            .submit(SubmitRun {
                text: text.to_string(),
                source: RunSource::Manual,
                ticket_key: None,
            })
            .run_id
    }

    #[tokio::test(start_paused = true)]
    async fn test_ci_request_completes_all() {
        let (orchestrator, _) = engine(Duration::ZERO, Arc::new(PassThrough));
        let run_id = submit(&orchestrator, "Set up CI for repo R on branch main");

        let run = orchestrator.wait_for_terminal(run_id).await.unwrap();
        assert_eq!(run.state, RunState::Completed);
        assert_eq!(run.tasks.len(), 1);
        assert_eq!(run.tasks[0].kind.known(), Some(TaskKind::CiPipeline));
        assert_eq!(run.tasks[0].parameters["repository"], json!("R"));

        let outcome = orchestrator.outcome(run_id).unwrap();
        assert_eq!(outcome.classification(), Some(Classification::CompletedAll));
        assert_eq!(outcome, orchestrator.outcome(run_id).unwrap());

        let results = orchestrator.results(run_id).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload.as_ref().unwrap()["branch"], "main");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_actionable_tasks() {
        let (orchestrator, executors) = engine(Duration::ZERO, Arc::new(PassThrough));
        let run_id = submit(&orchestrator, "What a lovely day");

        orchestrator.wait_for_terminal(run_id).await.unwrap();
        assert_eq!(
            orchestrator.outcome(run_id).unwrap().classification(),
            Some(Classification::NoActionableTasks)
        );
        assert_eq!(executors.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_timeout_fails_run() {
        let (orchestrator, executors) = engine(Duration::from_secs(60), Arc::new(PassThrough));
        let run_id = submit(&orchestrator, "Set up CI");

        let run = orchestrator.wait_for_terminal(run_id).await.unwrap();
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.error.unwrap().kind, ErrorKind::ExtractionTimeout);
        assert_eq!(executors.calls.load(Ordering::SeqCst), 0);

        let events = orchestrator.run_events(run_id).unwrap();
        assert!(
            !events
                .iter()
                .any(|e| e.event_type == EventType::TaskDispatched)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input_is_validation_error() {
        let (orchestrator, _) = engine(Duration::ZERO, Arc::new(PassThrough));
        let run_id = submit(&orchestrator, "   ");

        let run = orchestrator.wait_for_terminal(run_id).await.unwrap();
        assert_eq!(run.error.unwrap().kind, ErrorKind::ValidationError);
        assert!(matches!(
            orchestrator.outcome(run_id).unwrap(),
            RunOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_late_cancel_does_not_undo_completed_dispatch() {
        let (orchestrator, _) = engine(Duration::ZERO, Arc::new(PassThrough));
        let store = orchestrator.store.clone();
        let run_id = store.insert(Run::new("Set up CI".to_string(), RunSource::Manual, None));
        store.transition(run_id, RunState::Extracting).unwrap();
        store
            .set_tasks(
                run_id,
                vec![TaskDescriptor {
                    id: "task-1".to_string(),
                    kind: TaskKind::CiPipeline.into(),
                    description: "Set up CI".to_string(),
                    parameters: Default::default(),
                    sequence_index: 0,
                }],
            )
            .unwrap();
        store.transition(run_id, RunState::Dispatched).unwrap();
        store
            .record_result(
                run_id,
                TaskResult::success("task-1", TaskKind::CiPipeline.into(), json!({"ok": true}), 5),
            )
            .unwrap();

        // Cancel raised after the last result was recorded
        let (cancel_tx, _) = watch::channel(true);
        orchestrator.lock_cancels().insert(run_id, cancel_tx);

        orchestrator.conclude(run_id, DispatchEnd::Completed);

        let run = store.get(run_id).unwrap();
        assert_eq!(run.state, RunState::Completed);
        assert_eq!(
            run.outcome.unwrap().classification(),
            Some(Classification::CompletedAll)
        );
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_fails_run() {
        let (orchestrator, _) = engine(Duration::ZERO, Arc::new(PassThrough));
        let store = orchestrator.store.clone();
        let run_id = store.insert(Run::new("Set up CI".to_string(), RunSource::Manual, None));
        store.transition(run_id, RunState::Extracting).unwrap();
        store.transition(run_id, RunState::Dispatched).unwrap();

        orchestrator.conclude(run_id, DispatchEnd::Cancelled);

        let run = store.get(run_id).unwrap();
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.error.unwrap().kind, ErrorKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hook_rejection_fails_before_dispatch() {
        let (orchestrator, executors) = engine(Duration::ZERO, Arc::new(RejectAll));
        let run_id = submit(&orchestrator, "Set up CI");

        let run = orchestrator.wait_for_terminal(run_id).await.unwrap();
        let error = run.error.unwrap();
        assert_eq!(error.kind, ErrorKind::ValidationError);
        assert_eq!(error.message, "needs a human");
        assert_eq!(executors.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_and_success_is_partial_failure() {
        let (orchestrator, _) = engine(Duration::ZERO, Arc::new(PassThrough));
        let run_id = submit(&orchestrator, "Set up CI and deploy it");

        orchestrator.wait_for_terminal(run_id).await.unwrap();
        let RunOutcome::Completed { summary, .. } = orchestrator.outcome(run_id).unwrap() else {
            panic!("expected completed outcome");
        };
        assert_eq!(summary.classification, Classification::PartialFailure);
        assert_eq!(summary.tasks[0].status, TaskStatus::Success);
        assert!(summary.tasks[0].payload.is_some());
        assert_eq!(summary.tasks[1].status, TaskStatus::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_order_for_a_run() {
        let (orchestrator, _) = engine(Duration::ZERO, Arc::new(PassThrough));
        let run_id = submit(&orchestrator, "Set up CI");
        orchestrator.wait_for_terminal(run_id).await.unwrap();

        let events = orchestrator.run_events(run_id).unwrap();
        assert_eq!(events.first().unwrap().event_type, EventType::TaskReceived);
        assert_eq!(events.last().unwrap().event_type, EventType::RunCompleted);
        for pair in events.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }

        let states: Vec<&str> = events
            .iter()
            .filter(|e| e.event_type == EventType::StateChanged)
            .filter_map(|e| e.data["state"].as_str())
            .collect();
        assert_eq!(states, vec!["extracting", "dispatched", "aggregating"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_in_flight_run() {
        let (orchestrator, _) = engine(Duration::ZERO, Arc::new(PassThrough));
        let run_id = submit(&orchestrator, "deploy the app");

        let mut rx = orchestrator.store.subscribe(run_id).unwrap();
        rx.wait_for(|s| *s == RunState::Dispatched).await.unwrap();

        let handle = orchestrator.cancel(run_id).await.unwrap();
        assert_eq!(handle.state, RunState::Failed);

        let run = orchestrator.get_run(run_id).unwrap();
        assert_eq!(run.error.unwrap().kind, ErrorKind::Cancelled);
        assert!(run.results.is_empty());

        let events = orchestrator.run_events(run_id).unwrap();
        assert_eq!(events.last().unwrap().event_type, EventType::RunFailed);

        assert!(matches!(
            orchestrator.cancel(run_id).await,
            Err(OrchestratorError::AlreadyTerminal(_, RunState::Failed))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_conflicts_until_terminal() {
        let (orchestrator, _) = engine(Duration::from_secs(2), Arc::new(PassThrough));
        let run_id = submit(&orchestrator, "Set up CI");

        assert!(matches!(
            orchestrator.outcome(run_id),
            Err(OrchestratorError::NotFinished(_))
        ));
        orchestrator.wait_for_terminal(run_id).await.unwrap();
        assert!(orchestrator.outcome(run_id).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_webhook_is_rejected() {
        let (orchestrator, _) = engine(Duration::ZERO, Arc::new(PassThrough));
        let result = orchestrator.submit_webhook(JiraWebhook::default());
        assert!(matches!(result, Err(OrchestratorError::InvalidWebhook(_))));
        assert!(orchestrator.list_runs(RunView::All).is_empty());
    }

    #[tokio::test]
    async fn test_ticket_intake_requires_jira() {
        let (orchestrator, _) = engine(Duration::ZERO, Arc::new(PassThrough));
        assert!(matches!(
            orchestrator.submit_ticket("OPS-1").await,
            Err(OrchestratorError::TicketsDisabled)
        ));
    }
}
