//! Executor domain model
//!
//! Represents a remote executor service registered for one task kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::task::TaskKind;

/// Advisory health of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorHealth {
    /// Not checked yet; dispatch proceeds
    Unknown,

    /// Last health check succeeded
    Healthy,

    /// Health checks failed repeatedly; dispatch fails fast
    Unhealthy,
}

impl ExecutorHealth {
    /// Whether dispatch should be attempted
    pub fn accepts_work(&self) -> bool {
        !matches!(self, ExecutorHealth::Unhealthy)
    }
}

impl std::fmt::Display for ExecutorHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutorHealth::Unknown => write!(f, "Unknown"),
            ExecutorHealth::Healthy => write!(f, "Healthy"),
            ExecutorHealth::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Point-in-time view of one registry entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorStatus {
    /// Kind this executor serves
    pub kind: TaskKind,

    /// Base URL of the executor service
    pub base_url: String,

    /// Current advisory health
    pub health: ExecutorHealth,

    /// When the last health check finished
    pub last_checked_at: Option<DateTime<Utc>>,

    /// Missed health checks since the last success
    pub consecutive_failures: u32,

    /// Calls currently holding a concurrency slot
    pub in_flight: usize,

    /// Per-kind concurrency ceiling
    pub max_concurrency: usize,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}
