//! Run Repository
//!
//! In-memory store of runs. It owns every Run and is the only place they are
//! mutated, so the state machine and result immutability are enforced here.
//! The lock is never held across an await.

use chrono::Utc;
use relay_core::domain::outcome::RunOutcome;
use relay_core::domain::result::TaskResult;
use relay_core::domain::run::{Run, RunState};
use relay_core::domain::task::TaskDescriptor;
use relay_core::dto::run::RunView;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

/// Store error type
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("run {0} not found")]
    NotFound(Uuid),

    #[error("run {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: RunState,
        to: RunState,
    },

    #[error("run {id} is {state}, expected {expected}")]
    WrongState {
        id: Uuid,
        state: RunState,
        expected: RunState,
    },

    #[error("task {task_id} is not part of run {run_id}")]
    UnknownTask { run_id: Uuid, task_id: String },

    #[error("task {task_id} already has a result in run {run_id}")]
    DuplicateResult { run_id: Uuid, task_id: String },
}

struct Entry {
    run: Run,
    state_tx: watch::Sender<RunState>,
}

/// Process-local run store
#[derive(Default)]
pub struct RunStore {
    runs: RwLock<HashMap<Uuid, Entry>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly created run
    pub fn insert(&self, run: Run) -> Uuid {
        let id = run.id;
        let (state_tx, _) = watch::channel(run.state);
        self.write().insert(id, Entry { run, state_tx });
        id
    }

    /// Snapshot of one run
    pub fn get(&self, id: Uuid) -> Result<Run, StoreError> {
        self.read()
            .get(&id)
            .map(|entry| entry.run.clone())
            .ok_or(StoreError::NotFound(id))
    }

    /// Runs in the given view, newest first
    pub fn list(&self, view: RunView) -> Vec<Run> {
        let mut runs: Vec<Run> = self
            .read()
            .values()
            .filter(|entry| view.includes(entry.run.state))
            .map(|entry| entry.run.clone())
            .collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs
    }

    /// Watch a run's state
    pub fn subscribe(&self, id: Uuid) -> Result<watch::Receiver<RunState>, StoreError> {
        self.read()
            .get(&id)
            .map(|entry| entry.state_tx.subscribe())
            .ok_or(StoreError::NotFound(id))
    }

    /// Move a run along the state machine. Returns the previous state.
    ///
    /// Terminal states are reached through [`RunStore::finish`] only.
    pub fn transition(&self, id: Uuid, next: RunState) -> Result<RunState, StoreError> {
        let mut runs = self.write();
        let entry = runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let from = entry.run.state;

        if next.is_terminal() || !from.can_transition_to(next) {
            return Err(StoreError::InvalidTransition { id, from, to: next });
        }

        apply_state(entry, next);
        Ok(from)
    }

    /// Attach the extracted task list while the run is extracting
    pub fn set_tasks(&self, id: Uuid, tasks: Vec<TaskDescriptor>) -> Result<(), StoreError> {
        let mut runs = self.write();
        let entry = runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        expect_state(id, &entry.run, RunState::Extracting)?;

        entry.run.tasks = tasks;
        entry.run.updated_at = Utc::now();
        Ok(())
    }

    /// Record the terminal result of one task
    ///
    /// Only accepted while the run is dispatched; a task gets exactly one.
    pub fn record_result(&self, id: Uuid, result: TaskResult) -> Result<(), StoreError> {
        let mut runs = self.write();
        let entry = runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        expect_state(id, &entry.run, RunState::Dispatched)?;

        if !entry.run.tasks.iter().any(|t| t.id == result.task_id) {
            return Err(StoreError::UnknownTask {
                run_id: id,
                task_id: result.task_id,
            });
        }

        if entry.run.results.contains_key(&result.task_id) {
            return Err(StoreError::DuplicateResult {
                run_id: id,
                task_id: result.task_id,
            });
        }

        entry.run.results.insert(result.task_id.clone(), result);
        entry.run.updated_at = Utc::now();
        Ok(())
    }

    /// Store the outcome and move the run to its terminal state
    ///
    /// A completed outcome requires `aggregating`; a failed one is accepted
    /// from any non-terminal state. Returns the previous state.
    pub fn finish(&self, id: Uuid, outcome: RunOutcome) -> Result<RunState, StoreError> {
        let mut runs = self.write();
        let entry = runs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let from = entry.run.state;

        let next = match &outcome {
            RunOutcome::Completed { .. } => RunState::Completed,
            RunOutcome::Failed { .. } => RunState::Failed,
        };

        if !from.can_transition_to(next) {
            return Err(StoreError::InvalidTransition { id, from, to: next });
        }

        if let RunOutcome::Failed { error, .. } = &outcome {
            entry.run.error = Some(error.clone());
        }
        entry.run.outcome = Some(outcome);
        apply_state(entry, next);
        Ok(from)
    }
}

impl RunStore {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Entry>> {
        self.runs.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Entry>> {
        self.runs.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply_state(entry: &mut Entry, next: RunState) {
    entry.run.state = next;
    entry.run.updated_at = Utc::now();
    entry.state_tx.send_replace(next);
}

fn expect_state(id: Uuid, run: &Run, expected: RunState) -> Result<(), StoreError> {
    if run.state != expected {
        return Err(StoreError::WrongState {
            id,
            state: run.state,
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::domain::outcome::{Classification, RunSummary};
    use relay_core::domain::result::{ErrorKind, FailureDetail};
    use relay_core::domain::run::RunSource;
    use relay_core::domain::task::{DeclaredKind, TaskKind};

    fn descriptor(id: &str, index: usize) -> TaskDescriptor {
        TaskDescriptor {
            id: id.to_string(),
            kind: DeclaredKind::Known(TaskKind::CiPipeline),
            description: String::new(),
            parameters: Default::default(),
            sequence_index: index,
        }
    }

    fn dispatched_run(store: &RunStore) -> Uuid {
        let id = store.insert(Run::new("x".to_string(), RunSource::Manual, None));
        store.transition(id, RunState::Extracting).unwrap();
        store
            .set_tasks(id, vec![descriptor("task-1", 0), descriptor("task-2", 1)])
            .unwrap();
        store.transition(id, RunState::Dispatched).unwrap();
        id
    }

    fn success(task_id: &str) -> TaskResult {
        TaskResult::success(
            task_id,
            TaskKind::CiPipeline.into(),
            serde_json::json!({}),
            1,
        )
    }

    fn empty_summary() -> RunSummary {
        RunSummary {
            classification: Classification::NoActionableTasks,
            total: 0,
            succeeded: 0,
            failed: 0,
            timed_out: 0,
            tasks: vec![],
            kinds: vec![],
        }
    }

    #[test]
    fn test_rejects_skipped_transition() {
        let store = RunStore::new();
        let id = store.insert(Run::new("x".to_string(), RunSource::Manual, None));
        let err = store.transition(id, RunState::Aggregating).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_result_recorded_once() {
        let store = RunStore::new();
        let id = dispatched_run(&store);

        store.record_result(id, success("task-1")).unwrap();
        let err = store.record_result(id, success("task-1")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateResult { .. }));

        let err = store.record_result(id, success("task-9")).unwrap_err();
        assert!(matches!(err, StoreError::UnknownTask { .. }));
    }

    #[test]
    fn test_terminal_run_is_frozen() {
        let store = RunStore::new();
        let id = dispatched_run(&store);
        let failure = FailureDetail::new(ErrorKind::Cancelled, "cancelled by caller");

        store
            .finish(
                id,
                RunOutcome::Failed {
                    run_id: id,
                    error: failure.clone(),
                },
            )
            .unwrap();

        let run = store.get(id).unwrap();
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.error, Some(failure));

        assert!(store.record_result(id, success("task-2")).is_err());
        assert!(store.transition(id, RunState::Aggregating).is_err());
        assert!(
            store
                .finish(
                    id,
                    RunOutcome::Completed {
                        run_id: id,
                        summary: empty_summary(),
                    },
                )
                .is_err()
        );
    }

    #[test]
    fn test_completed_requires_aggregating() {
        let store = RunStore::new();
        let id = dispatched_run(&store);
        let outcome = RunOutcome::Completed {
            run_id: id,
            summary: empty_summary(),
        };

        assert!(store.finish(id, outcome.clone()).is_err());
        store.transition(id, RunState::Aggregating).unwrap();
        assert_eq!(store.finish(id, outcome).unwrap(), RunState::Aggregating);
    }

    #[test]
    fn test_list_views() {
        let store = RunStore::new();
        let active = dispatched_run(&store);
        let done = store.insert(Run::new("y".to_string(), RunSource::Webhook, None));
        store
            .finish(
                done,
                RunOutcome::Failed {
                    run_id: done,
                    error: FailureDetail::new(ErrorKind::ValidationError, "empty"),
                },
            )
            .unwrap();

        let ids: Vec<Uuid> = store.list(RunView::Active).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![active]);
        let ids: Vec<Uuid> = store.list(RunView::History).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![done]);
        assert_eq!(store.list(RunView::All).len(), 2);
    }

    #[tokio::test]
    async fn test_subscribers_see_terminal_state() {
        let store = RunStore::new();
        let id = dispatched_run(&store);
        let mut rx = store.subscribe(id).unwrap();

        store.transition(id, RunState::Aggregating).unwrap();
        store
            .finish(
                id,
                RunOutcome::Completed {
                    run_id: id,
                    summary: empty_summary(),
                },
            )
            .unwrap();

        let state = *rx.wait_for(|s| s.is_terminal()).await.unwrap();
        assert_eq!(state, RunState::Completed);
    }
}
