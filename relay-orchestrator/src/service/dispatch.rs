//! Dispatch Coordinator
//!
//! Fans a run's task descriptors out to their executors, one unit of work
//! per descriptor. Units report back over a channel and the collector loop
//! below is the single writer of the run's results and task events.
//!
//! Admission is bounded twice: the per-kind limiter from the registry (shared
//! by every run) and a global ceiling across kinds.

use relay_core::domain::event::{EventType, NewEvent, Service};
use relay_core::domain::executor::ExecutorHealth;
use relay_core::domain::result::{ErrorKind, FailureDetail, TaskResult};
use relay_core::domain::task::{DeclaredKind, TaskDescriptor, TaskKind};
use relay_core::dto::executor::ExecutionRequest;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::repository::{EventRecorder, RunStore};
use crate::service::executor::{ExecutorCallError, ExecutorClient, build_request};
use crate::service::registry::{ExecutorEndpoint, ExecutorRegistry};

/// How the dispatch stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEnd {
    /// Every task has a terminal result
    Completed,

    /// The run deadline passed; remaining tasks were marked `timeout`
    DeadlineExceeded,

    /// The run was cancelled; in-flight results will be discarded
    Cancelled,
}

enum UnitMessage {
    Started { task_id: String, kind: TaskKind },
    Finished(TaskResult),
}

/// Reports a failure if a unit ends without finishing (panic, abort)
struct UnitGuard {
    tx: mpsc::Sender<UnitMessage>,
    task_id: String,
    kind: TaskKind,
    finished: bool,
}

impl UnitGuard {
    async fn finish(mut self, result: TaskResult) {
        self.finished = true;
        let _ = self.tx.send(UnitMessage::Finished(result)).await;
    }
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let result = TaskResult::failed(
            self.task_id.clone(),
            self.kind.into(),
            FailureDetail::new(ErrorKind::ExecutorFailure, "dispatch unit ended unexpectedly"),
            0,
        );
        let _ = self.tx.try_send(UnitMessage::Finished(result));
    }
}

/// A task that passed the fail-fast checks
struct Prepared {
    task: TaskDescriptor,
    endpoint: ExecutorEndpoint,
    request: ExecutionRequest,
}

/// Dispatch Coordinator
pub struct DispatchCoordinator {
    registry: Arc<ExecutorRegistry>,
    client: Arc<dyn ExecutorClient>,
    global: Arc<Semaphore>,
    store: Arc<RunStore>,
    events: Arc<EventRecorder>,
}

impl DispatchCoordinator {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        client: Arc<dyn ExecutorClient>,
        global_max_in_flight: usize,
        store: Arc<RunStore>,
        events: Arc<EventRecorder>,
    ) -> Self {
        Self {
            registry,
            client,
            global: Arc::new(Semaphore::new(global_max_in_flight.max(1))),
            store,
            events,
        }
    }

    /// Dispatch every task of a run and record one result per task
    ///
    /// The run must be in `dispatched`. Returns once every task has a result,
    /// the deadline passes, or `cancel` flips to `true`.
    pub async fn dispatch(
        &self,
        run_id: Uuid,
        tasks: Vec<TaskDescriptor>,
        deadline: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> DispatchEnd {
        let started_at = Instant::now();
        let deadline_at = started_at + deadline;

        if *cancel.borrow() {
            return DispatchEnd::Cancelled;
        }

        let mut prepared = Vec::new();
        for task in tasks {
            match self.prepare(run_id, &task) {
                Ok(p) => prepared.push(p),
                Err(error) => {
                    debug!("Run {} task {} failed fast: {}", run_id, task.id, error);
                    let result = TaskResult::failed(task.id.clone(), task.kind.clone(), error, 0);
                    self.record(run_id, result);
                }
            }
        }

        if prepared.is_empty() {
            return DispatchEnd::Completed;
        }

        info!("Run {}: dispatching {} task(s)", run_id, prepared.len());

        let (tx, mut rx) = mpsc::channel(prepared.len() * 2);
        let mut pending: BTreeMap<String, DeclaredKind> = prepared
            .iter()
            .map(|p| (p.task.id.clone(), p.task.kind.clone()))
            .collect();
        let mut units = JoinSet::new();
        let (stop_tx, stop_rx) = watch::channel(false);

        for unit in prepared {
            units.spawn(run_unit(
                unit,
                self.client.clone(),
                self.global.clone(),
                cancel.clone(),
                stop_rx.clone(),
                tx.clone(),
            ));
        }
        drop(tx);

        let mut cancel_open = true;
        let end = loop {
            if pending.is_empty() {
                break DispatchEnd::Completed;
            }

            tokio::select! {
                biased;

                changed = cancel.changed(), if cancel_open => {
                    match changed {
                        Ok(()) if *cancel.borrow() => break DispatchEnd::Cancelled,
                        Ok(()) => {}
                        Err(_) => cancel_open = false,
                    }
                }

                _ = sleep_until(deadline_at) => {
                    warn!(
                        "Run {}: deadline of {:?} exceeded with {} task(s) pending",
                        run_id, deadline, pending.len()
                    );
                    let elapsed = started_at.elapsed().as_millis() as u64;
                    for (task_id, kind) in std::mem::take(&mut pending) {
                        let result = TaskResult::failed(
                            task_id,
                            kind,
                            FailureDetail::new(ErrorKind::ExecutorTimeout, "run deadline exceeded"),
                            elapsed,
                        );
                        self.record(run_id, result);
                    }
                    break DispatchEnd::DeadlineExceeded;
                }

                message = rx.recv() => match message {
                    Some(UnitMessage::Started { task_id, kind }) => {
                        self.events.record(
                            NewEvent::new(
                                Service::Dispatch,
                                EventType::TaskDispatched,
                                format!("Dispatched {} to {} executor", task_id, kind),
                            )
                            .for_run(run_id)
                            .with_data(json!({ "task_id": task_id, "kind": kind })),
                        );
                    }
                    Some(UnitMessage::Finished(result)) => {
                        if pending.remove(&result.task_id).is_some() {
                            self.record(run_id, result);
                        }
                    }
                    None => {
                        // Every unit is gone; whatever is left never reported
                        for (task_id, kind) in std::mem::take(&mut pending) {
                            warn!("Run {}: task {} ended without a result", run_id, task_id);
                            let result = TaskResult::failed(
                                task_id,
                                kind,
                                FailureDetail::new(ErrorKind::ExecutorFailure, "dispatch unit ended unexpectedly"),
                                0,
                            );
                            self.record(run_id, result);
                        }
                        break DispatchEnd::Completed;
                    }
                }
            }
        };

        match end {
            DispatchEnd::Completed => {
                while let Some(joined) = units.join_next().await {
                    if let Err(e) = joined {
                        warn!("Dispatch unit for run {} panicked: {}", run_id, e);
                    }
                }
            }
            DispatchEnd::DeadlineExceeded | DispatchEnd::Cancelled => {
                // Queued units must not reach an executor once the run has ended
                stop_tx.send_replace(true);
                debug!(
                    "Run {}: detaching {} in-flight unit(s), their results are discarded",
                    run_id,
                    units.len()
                );
                units.detach_all();
            }
        }

        end
    }

    /// Resolve, health-check and build the request; any failure is final
    fn prepare(&self, run_id: Uuid, task: &TaskDescriptor) -> Result<Prepared, FailureDetail> {
        let endpoint = self
            .registry
            .resolve(&task.kind)
            .map_err(|e| FailureDetail::new(ErrorKind::UnknownKind, e.to_string()))?;

        if let Ok(ExecutorHealth::Unhealthy) = self.registry.health(endpoint.kind) {
            return Err(FailureDetail::new(
                ErrorKind::ExecutorUnavailable,
                format!("{} executor is unhealthy", endpoint.kind),
            ));
        }

        let parameters = build_request(endpoint.kind, &task.parameters)
            .map_err(|e| FailureDetail::new(e.kind(), e.to_string()))?;

        let request = ExecutionRequest {
            run_id,
            task_id: task.id.clone(),
            kind: endpoint.kind,
            description: task.description.clone(),
            parameters,
        };

        Ok(Prepared {
            task: task.clone(),
            endpoint,
            request,
        })
    }

    /// Store one result and emit its event
    fn record(&self, run_id: Uuid, result: TaskResult) {
        let (event_type, description) = match &result.error {
            None => (
                EventType::TaskCompleted,
                format!("Task {} completed", result.task_id),
            ),
            Some(error) => (
                EventType::TaskFailed,
                format!("Task {} failed: {}", result.task_id, error),
            ),
        };

        let data = json!({
            "task_id": result.task_id,
            "kind": result.kind,
            "status": result.status,
            "error_kind": result.error.as_ref().map(|e| e.kind),
            "duration_ms": result.duration_ms,
        });

        if let Err(e) = self.store.record_result(run_id, result) {
            warn!("Dropping result for run {}: {}", run_id, e);
            return;
        }

        self.events.record(
            NewEvent::new(Service::Dispatch, event_type, description)
                .for_run(run_id)
                .with_data(data),
        );
    }
}

/// One unit of work: wait for admission, call the executor, report back
///
/// `stop` is raised by the collector when it stops listening; a unit that
/// sees it before its call starts never contacts the executor.
async fn run_unit(
    unit: Prepared,
    client: Arc<dyn ExecutorClient>,
    global: Arc<Semaphore>,
    cancel: watch::Receiver<bool>,
    stop: watch::Receiver<bool>,
    tx: mpsc::Sender<UnitMessage>,
) {
    let Prepared {
        task,
        endpoint,
        request,
    } = unit;

    let guard = UnitGuard {
        tx: tx.clone(),
        task_id: task.id.clone(),
        kind: endpoint.kind,
        finished: false,
    };

    let admitted = async {
        let kind_permit = endpoint.limiter.clone().acquire_owned().await.ok()?;
        let global_permit = global.acquire_owned().await.ok()?;
        Some((kind_permit, global_permit))
    };
    let admitted = tokio::select! {
        biased;

        _ = raised(stop.clone()) => {
            debug!("Dropping queued {}, dispatch already ended", task.id);
            guard.finish(skipped_result(&task, "run ended before dispatch")).await;
            return;
        }

        admitted = admitted => admitted,
    };
    let Some(_permits) = admitted else {
        let result = TaskResult::failed(
            task.id,
            task.kind,
            FailureDetail::new(ErrorKind::ExecutorUnavailable, "executor admission closed"),
            0,
        );
        guard.finish(result).await;
        return;
    };

    if *cancel.borrow() || *stop.borrow() {
        debug!("Skipping {} of an ended run", task.id);
        guard.finish(skipped_result(&task, "run ended before dispatch")).await;
        return;
    }

    let _ = tx
        .send(UnitMessage::Started {
            task_id: task.id.clone(),
            kind: endpoint.kind,
        })
        .await;

    let call_started = Instant::now();
    let outcome = match timeout(endpoint.timeout, client.execute(&endpoint.base_url, &request)).await
    {
        Ok(outcome) => outcome,
        Err(_) => Err(ExecutorCallError::Timeout(endpoint.timeout)),
    };
    let duration_ms = call_started.elapsed().as_millis() as u64;

    let result = match outcome {
        Ok(payload) => TaskResult::success(task.id, task.kind, payload, duration_ms),
        Err(e) => TaskResult::failed(
            task.id,
            task.kind,
            FailureDetail::new(e.kind(), e.to_string()),
            duration_ms,
        ),
    };

    guard.finish(result).await;
}

fn skipped_result(task: &TaskDescriptor, reason: &str) -> TaskResult {
    TaskResult::failed(
        task.id.clone(),
        task.kind.clone(),
        FailureDetail::new(ErrorKind::Cancelled, reason),
        0,
    )
}

/// Resolves once `signal` is raised; pends forever if its sender is gone
async fn raised(mut signal: watch::Receiver<bool>) {
    if signal.wait_for(|raised| *raised).await.is_err() {
        std::future::pending::<()>().await;
    }
}
