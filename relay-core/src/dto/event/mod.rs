//! Event DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filter for an event log query
///
/// Filters compose. `limit` keeps the most recent N of the filtered set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQuery {
    /// Only events at or after this instant
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,

    /// Only events for this run
    #[serde(default)]
    pub run_id: Option<Uuid>,

    /// Most recent N
    #[serde(default)]
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn for_run(run_id: Uuid) -> Self {
        Self {
            run_id: Some(run_id),
            ..Default::default()
        }
    }
}

/// Response of the administrative clear
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearedEvents {
    /// Number of events hidden by this clear
    pub hidden: usize,
}
