//! Executor DTOs
//!
//! Envelope POSTed to `{base_url}/execute` and the concrete per-kind request
//! bodies executors accept.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::task::TaskKind;

/// Request envelope sent to an executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub run_id: Uuid,
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub description: String,
    /// Normalised per-kind request body
    pub parameters: serde_json::Value,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_build_steps() -> Vec<String> {
    vec!["test".to_string(), "lint".to_string(), "build".to_string()]
}

/// CI pipeline generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiPipelineRequest {
    pub repository: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_build_steps")]
    pub build_steps: Vec<String>,
}

/// Chart/deployment descriptor generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelmChartRequest {
    pub repository: String,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub service_ports: Vec<serde_json::Value>,
    #[serde(default)]
    pub environment_variables: HashMap<String, serde_json::Value>,
}

/// Cluster deployment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub repository: String,
    pub namespace: String,
    #[serde(default)]
    pub cluster_details: Option<serde_json::Value>,
    #[serde(default)]
    pub release_name: Option<String>,
    #[serde(default)]
    pub helm_values: Option<serde_json::Value>,
}
