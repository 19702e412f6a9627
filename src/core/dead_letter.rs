//! Dead letter store for operations that failed permanently.
//!
//! Bounded by count (oldest evicted first) and by age (entries older than the
//! retention window are dropped lazily on read and by the scheduler's sweep).
//! Whichever limit triggers first wins.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::util::serde::{OperationId, Priority};

/// Why an operation ended up dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// The retry budget ran out.
    RetriesExhausted,
    /// The action reported a permanent failure.
    Permanent,
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted => f.write_str("retries_exhausted"),
            Self::Permanent => f.write_str("permanent"),
        }
    }
}

/// Inspectable record of a permanently failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// Original operation identifier.
    pub id: OperationId,
    /// Original priority.
    pub priority: Priority,
    /// Diagnostic name, if one was given.
    pub name: Option<String>,
    /// Submission time, ms since epoch.
    pub enqueued_at_ms: u128,
    /// Time of the final failure, ms since epoch.
    pub failed_at_ms: u128,
    /// Retries spent before giving up.
    pub retry_count: u32,
    /// Message of the last failure.
    pub last_error: String,
    /// Why the operation was dead-lettered.
    pub reason: DeadLetterReason,
}

#[derive(Debug)]
struct Record<P> {
    entry: DeadLetterEntry,
    failed_at: Instant,
    payload: P,
}

/// Bounded, time-retained store. `P` is whatever the owner needs to replay an
/// entry; the store never inspects it.
#[derive(Debug)]
pub struct DeadLetterStore<P> {
    records: VecDeque<Record<P>>,
    max_size: usize,
    retention: Duration,
}

impl<P> DeadLetterStore<P> {
    /// Create a store holding at most `max_size` entries for `retention`.
    #[must_use]
    pub fn new(max_size: usize, retention: Duration) -> Self {
        Self {
            records: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
            retention,
        }
    }

    /// Add an entry, evicting the oldest entries past `max_size`.
    pub fn add(&mut self, entry: DeadLetterEntry, payload: P, now: Instant) {
        self.records.push_back(Record {
            entry,
            failed_at: now,
            payload,
        });
        while self.records.len() > self.max_size {
            if let Some(evicted) = self.records.pop_front() {
                tracing::debug!(id = %evicted.entry.id, "dead letter evicted by size limit");
            }
        }
    }

    /// Drop entries older than the retention window. Returns how many.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.records.len();
        let retention = self.retention;
        self.records
            .retain(|r| now.saturating_duration_since(r.failed_at) < retention);
        before - self.records.len()
    }

    /// Entries still within retention, oldest first.
    pub fn list(&mut self, now: Instant) -> Vec<DeadLetterEntry> {
        self.prune(now);
        self.records.iter().map(|r| r.entry.clone()).collect()
    }

    /// Look up one entry within retention.
    pub fn get(&mut self, id: &OperationId, now: Instant) -> Option<DeadLetterEntry> {
        self.prune(now);
        self.records
            .iter()
            .find(|r| r.entry.id == *id)
            .map(|r| r.entry.clone())
    }

    /// Delete one entry.
    pub fn remove(&mut self, id: &OperationId) -> bool {
        self.take_any(id).is_some()
    }

    /// Remove an entry within retention and hand back its replay payload.
    pub fn take(&mut self, id: &OperationId, now: Instant) -> Option<(DeadLetterEntry, P)> {
        self.prune(now);
        self.take_any(id)
    }

    /// Delete every entry and return how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }

    /// Stored entries, including any not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn take_any(&mut self, id: &OperationId) -> Option<(DeadLetterEntry, P)> {
        let pos = self.records.iter().position(|r| r.entry.id == *id)?;
        self.records.remove(pos).map(|r| (r.entry, r.payload))
    }
}
