//! Lease tracking for admitted operations.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::operation::Operation;
use crate::util::serde::OperationId;

/// A time-boxed claim on an admitted operation.
#[derive(Debug)]
pub struct Lease {
    /// The leased operation.
    pub operation: Operation,
    /// Attempt number; completions carrying another number are stale.
    pub attempt: u64,
    /// When the lease was granted.
    pub granted_at: Instant,
}

/// In-flight operations keyed by id.
///
/// The tracker is the only place that sets or clears an operation's lease
/// expiry.
#[derive(Debug)]
pub struct LeaseTracker {
    leases: HashMap<OperationId, Lease>,
    timeout: Duration,
    next_attempt: u64,
}

impl LeaseTracker {
    /// Create a tracker granting leases of `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            leases: HashMap::new(),
            timeout,
            next_attempt: 0,
        }
    }

    /// Lease length.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Lease an operation and return the attempt number.
    pub fn grant(&mut self, mut operation: Operation, now: Instant) -> u64 {
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        operation.lease_expires_at = Some(now + self.timeout);
        self.leases.insert(
            operation.id(),
            Lease {
                operation,
                attempt,
                granted_at: now,
            },
        );
        attempt
    }

    /// Extend a live lease by the full timeout. Returns `false` for unknown ids.
    pub fn heartbeat(&mut self, id: &OperationId, now: Instant) -> bool {
        match self.leases.get_mut(id) {
            Some(lease) => {
                lease.operation.lease_expires_at = Some(now + self.timeout);
                true
            }
            None => false,
        }
    }

    /// Release the lease held by `attempt`. A completion from a superseded
    /// attempt returns `None` and leaves the current lease untouched.
    pub fn release(&mut self, id: &OperationId, attempt: u64) -> Option<Operation> {
        if self.leases.get(id)?.attempt != attempt {
            return None;
        }
        self.leases.remove(id).map(|lease| Self::clear(lease.operation))
    }

    /// Remove and return every lease expired at `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<Operation> {
        let expired: Vec<OperationId> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.operation.lease_expires_at.is_some_and(|at| at <= now))
            .map(|(id, _)| *id)
            .collect();
        let mut out: Vec<Operation> = expired
            .iter()
            .filter_map(|id| self.leases.remove(id))
            .map(|lease| Self::clear(lease.operation))
            .collect();
        out.sort_by_key(Operation::enqueued_at);
        out
    }

    /// Remove every lease.
    pub fn drain(&mut self) -> Vec<Operation> {
        self.leases
            .drain()
            .map(|(_, lease)| Self::clear(lease.operation))
            .collect()
    }

    /// Whether an operation is leased.
    #[must_use]
    pub fn contains(&self, id: &OperationId) -> bool {
        self.leases.contains_key(id)
    }

    /// Number of in-flight operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    fn clear(mut operation: Operation) -> Operation {
        operation.lease_expires_at = None;
        operation
    }
}
