//! Queued operation record.

use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;

use crate::core::executor::Job;
use crate::core::lane::LaneEntry;
use crate::util::clock::now_ms;
use crate::util::serde::{OperationId, Priority};

/// A unit of deferred work and its scheduling state.
///
/// At any time an operation is waiting in a lane, leased, parked for a retry,
/// or terminated. The scheduler moves it between those states; callers only
/// observe it through accessors.
pub struct Operation {
    id: OperationId,
    name: Option<String>,
    priority: Priority,
    enqueued_at: Instant,
    enqueued_at_ms: u128,
    lane_entered_at: Instant,
    pub(crate) retry_count: u32,
    pub(crate) last_error: Option<String>,
    pub(crate) lease_expires_at: Option<Instant>,
    pub(crate) job: Arc<dyn Job>,
}

impl Operation {
    pub(crate) fn new(
        id: OperationId,
        name: Option<String>,
        priority: Priority,
        job: Arc<dyn Job>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            name,
            priority,
            enqueued_at: now,
            enqueued_at_ms: now_ms(),
            lane_entered_at: now,
            retry_count: 0,
            last_error: None,
            lease_expires_at: None,
            job,
        }
    }

    /// Mark the moment the operation (re-)enters its lane.
    pub(crate) fn enter_lane(&mut self, now: Instant) {
        self.lane_entered_at = now;
    }

    /// Unique identifier.
    #[must_use]
    pub const fn id(&self) -> OperationId {
        self.id
    }

    /// Diagnostic name supplied at submission.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Priority lane the operation belongs to.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// When the operation was first submitted.
    #[must_use]
    pub const fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// Submission time in milliseconds since the Unix epoch.
    #[must_use]
    pub const fn enqueued_at_ms(&self) -> u128 {
        self.enqueued_at_ms
    }

    /// When the operation last entered its lane.
    #[must_use]
    pub const fn lane_entered_at(&self) -> Instant {
        self.lane_entered_at
    }

    /// Retries spent so far.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Message of the most recent failure.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Lease expiry while admitted.
    #[must_use]
    pub const fn lease_expires_at(&self) -> Option<Instant> {
        self.lease_expires_at
    }
}

impl LaneEntry for Operation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn entered_at(&self) -> Instant {
        self.lane_entered_at
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("retry_count", &self.retry_count)
            .field("last_error", &self.last_error)
            .field("lease_expires_at", &self.lease_expires_at)
            .finish_non_exhaustive()
    }
}
