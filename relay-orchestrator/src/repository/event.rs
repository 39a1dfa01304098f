//! Event Recorder
//!
//! Process-wide, capacity-bounded, append-only event log. Events are stamped
//! with an insertion sequence and a timestamp that never goes backwards, so
//! timestamp order and insertion order always agree.

use chrono::{DateTime, Utc};
use relay_core::domain::event::{Event, NewEvent};
use relay_core::dto::event::EventQuery;
use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

struct EventLog {
    events: VecDeque<Event>,
    next_sequence: u64,
    last_timestamp: Option<DateTime<Utc>>,
    /// Events with a sequence below this are hidden from queries
    watermark: u64,
}

/// Bounded ring buffer of events exposed only through record/query/clear
pub struct EventRecorder {
    capacity: usize,
    log: RwLock<EventLog>,
}

impl EventRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            log: RwLock::new(EventLog {
                events: VecDeque::with_capacity(capacity.min(4096)),
                next_sequence: 0,
                last_timestamp: None,
                watermark: 0,
            }),
        }
    }

    /// Append an event
    ///
    /// Never fails. The oldest event is evicted once capacity is exceeded.
    pub fn record(&self, event: NewEvent) -> Event {
        info!(
            "SYSTEM EVENT [{}] {}: {}",
            event.service, event.event_type, event.description
        );

        let mut log = self.write();

        let mut timestamp = Utc::now();
        if let Some(last) = log.last_timestamp {
            if timestamp < last {
                timestamp = last;
            }
        }

        let stamped = Event {
            sequence: log.next_sequence,
            timestamp,
            run_id: event.run_id,
            service: event.service,
            event_type: event.event_type,
            description: event.description,
            data: event.data,
        };

        log.next_sequence += 1;
        log.last_timestamp = Some(timestamp);
        log.events.push_back(stamped.clone());

        while log.events.len() > self.capacity {
            log.events.pop_front();
        }

        stamped
    }

    /// Events matching `filter`, oldest first
    pub fn query(&self, filter: &EventQuery) -> Vec<Event> {
        let log = self.read();
        let watermark = log.watermark;

        let mut matched: Vec<Event> = log
            .events
            .iter()
            .filter(|e| e.sequence >= watermark)
            .filter(|e| filter.run_id.is_none_or(|id| e.run_id == Some(id)))
            .filter(|e| filter.since.is_none_or(|since| e.timestamp >= since))
            .cloned()
            .collect();

        if let Some(limit) = filter.limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }

        matched
    }

    /// Hide everything recorded so far from later queries
    ///
    /// Returns how many visible events were hidden. Retained events are left
    /// in the buffer; only capacity eviction drops them.
    pub fn clear(&self) -> usize {
        let mut log = self.write();
        let watermark = log.watermark;
        let hidden = log
            .events
            .iter()
            .filter(|e| e.sequence >= watermark)
            .count();
        log.watermark = log.next_sequence;
        hidden
    }

    /// Number of retained events, hidden ones included
    pub fn retained(&self) -> usize {
        self.read().events.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, EventLog> {
        self.log.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EventLog> {
        self.log.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
