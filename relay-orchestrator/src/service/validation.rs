//! Pre-dispatch validation hook
//!
//! Runs between extraction and dispatch. The default hook lets everything
//! through; `RequiredParameters` rejects a run whose tasks lack required
//! parameters and lists what is missing.

use async_trait::async_trait;
use relay_core::domain::task::{TaskDescriptor, TaskKind};
use std::fmt::Write as _;
use thiserror::Error;
use uuid::Uuid;

/// Reason a hook refused a run
#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct Rejection(pub String);

/// Hook invoked on the extracted task list before dispatch
#[async_trait]
pub trait PreDispatchHook: Send + Sync {
    async fn review(&self, run_id: Uuid, tasks: &[TaskDescriptor]) -> Result<(), Rejection>;
}

/// No-op hook
pub struct PassThrough;

#[async_trait]
impl PreDispatchHook for PassThrough {
    async fn review(&self, _run_id: Uuid, _tasks: &[TaskDescriptor]) -> Result<(), Rejection> {
        Ok(())
    }
}

/// Parameters a kind cannot run without
pub fn required_fields(kind: TaskKind) -> &'static [&'static str] {
    match kind {
        TaskKind::CiPipeline => &["repository"],
        TaskKind::HelmChart => &["repository", "app_name"],
        TaskKind::Deploy => &["repository", "namespace", "cluster_details"],
    }
}

/// Parameters that improve the result when present
pub fn suggested_fields(kind: TaskKind) -> &'static [&'static str] {
    match kind {
        TaskKind::CiPipeline => &["branch", "build_steps"],
        TaskKind::HelmChart => &["namespace", "values"],
        TaskKind::Deploy => &["helm_values", "release_name"],
    }
}

fn describe(field: &str) -> &'static str {
    match field {
        "repository" => "Git repository URL (e.g., https://github.com/username/repo)",
        "branch" => "Git branch to use (e.g., main, develop)",
        "build_steps" => "List of build steps to include (e.g., test, lint, build)",
        "app_name" => "Name of the application for the chart",
        "namespace" => "Kubernetes namespace for deployment",
        "values" => "Custom values for the chart",
        "cluster_details" => "Target cluster connection details",
        "helm_values" => "Values to override in the chart",
        "release_name" => "Release name for deployment",
        _ => "Additional parameter",
    }
}

/// Per-task review result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReview {
    pub task_id: String,
    pub kind: TaskKind,
    pub missing_required: Vec<&'static str>,
    pub missing_suggested: Vec<&'static str>,
}

/// Review every known-kind task
///
/// Unknown kinds are skipped; dispatch fails them individually.
pub fn review_tasks(tasks: &[TaskDescriptor]) -> Vec<TaskReview> {
    tasks
        .iter()
        .filter_map(|task| {
            let kind = task.kind.known()?;
            let missing = |fields: &'static [&'static str]| {
                fields
                    .iter()
                    .copied()
                    .filter(|f| task.parameters.get(*f).is_none_or(|v| v.is_null()))
                    .collect::<Vec<_>>()
            };
            Some(TaskReview {
                task_id: task.id.clone(),
                kind,
                missing_required: missing(required_fields(kind)),
                missing_suggested: missing(suggested_fields(kind)),
            })
        })
        .collect()
}

/// Human-readable list of what each task is missing
pub fn render_reviews(reviews: &[TaskReview]) -> String {
    let mut out = String::from("Some tasks are missing required information:\n");
    for review in reviews {
        if review.missing_required.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{} ({}):", review.task_id, review.kind);
        for field in &review.missing_required {
            let _ = writeln!(out, "  - required {}: {}", field, describe(field));
        }
        for field in &review.missing_suggested {
            let _ = writeln!(out, "  - suggested {}: {}", field, describe(field));
        }
    }
    out.trim_end().to_string()
}

/// Rejects runs whose tasks lack required parameters
pub struct RequiredParameters;

#[async_trait]
impl PreDispatchHook for RequiredParameters {
    async fn review(&self, _run_id: Uuid, tasks: &[TaskDescriptor]) -> Result<(), Rejection> {
        let reviews = review_tasks(tasks);
        if reviews.iter().all(|r| r.missing_required.is_empty()) {
            return Ok(());
        }
        Err(Rejection(render_reviews(&reviews)))
    }
}
