//! Task domain types
//!
//! A task descriptor is one actionable unit of work extracted from a free-form
//! request. The orchestrator never looks inside `parameters`; it only routes
//! on `kind` and reports in `sequence_index` order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque parameter bag passed through verbatim to the executor adapter
pub type Parameters = HashMap<String, serde_json::Value>;

/// The closed set of work kinds an executor can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CiPipeline,
    HelmChart,
    Deploy,
}

impl TaskKind {
    /// Every registrable kind, in reporting order
    pub const ALL: [TaskKind; 3] = [TaskKind::CiPipeline, TaskKind::HelmChart, TaskKind::Deploy];

    /// Canonical snake_case label
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::CiPipeline => "ci_pipeline",
            TaskKind::HelmChart => "helm_chart",
            TaskKind::Deploy => "deploy",
        }
    }

    /// Parse a label produced by the extraction backend
    ///
    /// Accepts the canonical names and the short aliases (`ci`, `helm`,
    /// `deployment`), case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "ci" | "ci_pipeline" | "ci-pipeline" | "pipeline" => Some(TaskKind::CiPipeline),
            "helm" | "helm_chart" | "helm-chart" | "chart" => Some(TaskKind::HelmChart),
            "deploy" | "deployment" => Some(TaskKind::Deploy),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind as declared by the extractor
///
/// Unrecognised labels are kept verbatim so that they surface as an
/// `unknown_kind` result instead of disappearing from the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeclaredKind {
    Known(TaskKind),
    Unknown(String),
}

impl DeclaredKind {
    pub fn from_label(label: &str) -> Self {
        match TaskKind::from_label(label) {
            Some(kind) => DeclaredKind::Known(kind),
            None => DeclaredKind::Unknown(label.trim().to_string()),
        }
    }

    pub fn known(&self) -> Option<TaskKind> {
        match self {
            DeclaredKind::Known(kind) => Some(*kind),
            DeclaredKind::Unknown(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeclaredKind::Known(kind) => kind.as_str(),
            DeclaredKind::Unknown(label) => label,
        }
    }
}

impl From<TaskKind> for DeclaredKind {
    fn from(kind: TaskKind) -> Self {
        DeclaredKind::Known(kind)
    }
}

impl std::fmt::Display for DeclaredKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured representation of one unit of work
///
/// Owned by exactly one run. `id` is assigned at extraction time and is
/// unique within the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub id: String,
    pub kind: DeclaredKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Parameters,
    /// Position in the extracted list; reporting order only
    pub sequence_index: usize,
}
