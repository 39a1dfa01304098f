//! Result Aggregator
//!
//! Reduces a run's per-task results into one classified outcome. Aggregation
//! never fails; it only classifies.

use relay_core::domain::outcome::{
    Classification, KindSummary, RunOutcome, RunSummary, TaskSummary,
};
use relay_core::domain::result::{ErrorKind, FailureDetail, TaskStatus};
use relay_core::domain::run::Run;
use relay_core::domain::task::TaskDescriptor;
use tracing::warn;
use uuid::Uuid;

/// Classify a set of terminal statuses
pub fn classify(statuses: &[TaskStatus]) -> Classification {
    if statuses.is_empty() {
        return Classification::NoActionableTasks;
    }

    let succeeded = statuses.iter().filter(|s| s.is_success()).count();
    if succeeded == statuses.len() {
        Classification::CompletedAll
    } else if succeeded == 0 {
        Classification::FailedAll
    } else {
        Classification::PartialFailure
    }
}

/// Build the outcome of a run whose tasks all have results
pub fn aggregate(run: &Run) -> RunOutcome {
    let mut ordered: Vec<&TaskDescriptor> = run.tasks.iter().collect();
    ordered.sort_by_key(|t| t.sequence_index);

    let tasks: Vec<TaskSummary> = ordered
        .into_iter()
        .map(|task| summarize(run, task))
        .collect();

    let statuses: Vec<TaskStatus> = tasks.iter().map(|t| t.status).collect();
    let count = |status: TaskStatus| statuses.iter().filter(|s| **s == status).count();

    let mut kinds: Vec<KindSummary> = Vec::new();
    for task in &tasks {
        let position = match kinds.iter().position(|k| k.kind == task.kind) {
            Some(position) => position,
            None => {
                kinds.push(KindSummary {
                    kind: task.kind.clone(),
                    statuses: Vec::new(),
                    succeeded: 0,
                    failed: 0,
                    timed_out: 0,
                });
                kinds.len() - 1
            }
        };

        let entry = &mut kinds[position];
        entry.statuses.push(task.status);
        match task.status {
            TaskStatus::Success => entry.succeeded += 1,
            TaskStatus::Failure => entry.failed += 1,
            TaskStatus::Timeout => entry.timed_out += 1,
        }
    }

    let summary = RunSummary {
        classification: classify(&statuses),
        total: tasks.len(),
        succeeded: count(TaskStatus::Success),
        failed: count(TaskStatus::Failure),
        timed_out: count(TaskStatus::Timeout),
        tasks,
        kinds,
    };

    RunOutcome::Completed {
        run_id: run.id,
        summary,
    }
}

/// Outcome of a run that ended with a fatal error
pub fn failed(run_id: Uuid, error: FailureDetail) -> RunOutcome {
    RunOutcome::Failed { run_id, error }
}

fn summarize(run: &Run, task: &TaskDescriptor) -> TaskSummary {
    match run.results.get(&task.id) {
        Some(result) => TaskSummary {
            task_id: task.id.clone(),
            sequence_index: task.sequence_index,
            kind: task.kind.clone(),
            description: task.description.clone(),
            status: result.status,
            payload: result.payload.clone(),
            error: result.error.clone(),
            duration_ms: result.duration_ms,
        },
        None => {
            warn!("Run {} task {} has no result at aggregation", run.id, task.id);
            TaskSummary {
                task_id: task.id.clone(),
                sequence_index: task.sequence_index,
                kind: task.kind.clone(),
                description: task.description.clone(),
                status: TaskStatus::Timeout,
                payload: None,
                error: Some(FailureDetail::new(
                    ErrorKind::ExecutorTimeout,
                    "no result recorded",
                )),
                duration_ms: 0,
            }
        }
    }
}
