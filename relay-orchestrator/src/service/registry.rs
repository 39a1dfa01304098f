//! Executor Registry
//!
//! Static mapping from task kind to executor endpoint, loaded at startup.
//! Each entry carries the per-kind timeout, a concurrency limiter shared by
//! every run, and advisory health maintained by a background health check loop.

use chrono::{DateTime, Utc};
use relay_core::domain::event::{EventType, NewEvent, Service};
use relay_core::domain::executor::{ExecutorHealth, ExecutorStatus};
use relay_core::domain::task::{DeclaredKind, TaskKind};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::repository::EventRecorder;
use crate::service::executor::ExecutorClient;

/// Registry error type
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no executor registered for kind '{0}'")]
    UnknownKind(String),
}

/// Where and how to call the executor of one kind
#[derive(Debug, Clone)]
pub struct ExecutorEndpoint {
    pub kind: TaskKind,
    pub base_url: String,
    pub timeout: Duration,
    /// Per-kind admission gate, shared across runs
    pub limiter: Arc<Semaphore>,
}

#[derive(Debug, Clone, Copy)]
struct HealthState {
    health: ExecutorHealth,
    last_checked_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

struct Entry {
    endpoint: ExecutorEndpoint,
    max_concurrency: usize,
    health: RwLock<HealthState>,
}

/// Kind to executor mapping
pub struct ExecutorRegistry {
    entries: BTreeMap<TaskKind, Entry>,
    failure_threshold: u32,
}

impl ExecutorRegistry {
    pub fn new(executors: &BTreeMap<TaskKind, ExecutorConfig>, failure_threshold: u32) -> Self {
        let entries = executors
            .iter()
            .map(|(kind, config)| {
                let entry = Entry {
                    endpoint: ExecutorEndpoint {
                        kind: *kind,
                        base_url: config.base_url.trim_end_matches('/').to_string(),
                        timeout: config.timeout,
                        limiter: Arc::new(Semaphore::new(config.max_concurrency)),
                    },
                    max_concurrency: config.max_concurrency,
                    health: RwLock::new(HealthState {
                        health: ExecutorHealth::Unknown,
                        last_checked_at: None,
                        consecutive_failures: 0,
                    }),
                };
                (*kind, entry)
            })
            .collect();

        Self {
            entries,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Endpoint for a declared kind
    ///
    /// Unrecognised labels and recognised-but-unregistered kinds both fail
    /// with `UnknownKind`.
    pub fn resolve(&self, kind: &DeclaredKind) -> Result<ExecutorEndpoint, RegistryError> {
        kind.known()
            .and_then(|k| self.entries.get(&k))
            .map(|entry| entry.endpoint.clone())
            .ok_or_else(|| RegistryError::UnknownKind(kind.to_string()))
    }

    /// Current advisory health of a registered kind
    pub fn health(&self, kind: TaskKind) -> Result<ExecutorHealth, RegistryError> {
        self.entries
            .get(&kind)
            .map(|entry| read_health(entry).health)
            .ok_or_else(|| RegistryError::UnknownKind(kind.to_string()))
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        self.entries.keys().copied().collect()
    }

    /// Snapshot of every entry
    pub fn statuses(&self) -> Vec<ExecutorStatus> {
        self.entries
            .values()
            .map(|entry| {
                let health = read_health(entry);
                let available = entry.endpoint.limiter.available_permits();
                ExecutorStatus {
                    kind: entry.endpoint.kind,
                    base_url: entry.endpoint.base_url.clone(),
                    health: health.health,
                    last_checked_at: health.last_checked_at,
                    consecutive_failures: health.consecutive_failures,
                    in_flight: entry.max_concurrency.saturating_sub(available),
                    max_concurrency: entry.max_concurrency,
                    timeout_ms: entry.endpoint.timeout.as_millis() as u64,
                }
            })
            .collect()
    }

    /// Apply one health check result. Returns `(old, new)` when the health changed.
    ///
    /// A kind becomes unhealthy only after `failure_threshold` consecutive
    /// misses; a single success makes it healthy again.
    pub fn record_health_check(
        &self,
        kind: TaskKind,
        reachable: bool,
    ) -> Option<(ExecutorHealth, ExecutorHealth)> {
        let entry = self.entries.get(&kind)?;
        let mut state = entry
            .health
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let old = state.health;
        state.last_checked_at = Some(Utc::now());

        if reachable {
            state.consecutive_failures = 0;
            state.health = ExecutorHealth::Healthy;
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            if state.consecutive_failures >= self.failure_threshold {
                state.health = ExecutorHealth::Unhealthy;
            }
        }

        (old != state.health).then_some((old, state.health))
    }

    /// Check every registered executor once
    pub async fn check_all(&self, client: &dyn ExecutorClient, events: &EventRecorder) {
        for entry in self.entries.values() {
            let kind = entry.endpoint.kind;
            let reachable = client.check_health(&entry.endpoint.base_url).await;
            debug!("Health check {}: reachable={}", kind, reachable);

            if let Some((old, new)) = self.record_health_check(kind, reachable) {
                if new == ExecutorHealth::Unhealthy {
                    warn!("Executor {} is now {}", kind, new);
                } else {
                    info!("Executor {} is now {}", kind, new);
                }

                events.record(
                    NewEvent::new(
                        Service::Registry,
                        EventType::ExecutorHealthChanged,
                        format!("Executor {} changed from {} to {}", kind, old, new),
                    )
                    .with_data(json!({ "kind": kind, "from": old, "to": new })),
                );
            }
        }
    }
}

fn read_health(entry: &Entry) -> HealthState {
    *entry
        .health
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Spawn the background health check loop
pub fn spawn_health_checks(
    registry: Arc<ExecutorRegistry>,
    client: Arc<dyn ExecutorClient>,
    events: Arc<EventRecorder>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting executor health checks (interval: {:?})", interval);
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            registry.check_all(client.as_ref(), &events).await;
        }
    })
}
