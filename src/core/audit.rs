//! Audit sink implementations.
//!
//! The scheduler reports lifecycle transitions to an optional sink. The
//! in-memory sink keeps a bounded ring for tests and diagnostics.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;
use crate::util::serde::{OperationId, Priority};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Lifecycle transition being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Submitted into a lane.
    Enqueue,
    /// Leased and started.
    Admit,
    /// Finished successfully.
    Complete,
    /// Scheduled for another attempt.
    Retry,
    /// Lease ran out before the attempt reported back.
    LeaseExpired,
    /// Moved to the dead letter store.
    DeadLetter,
    /// Replayed out of the dead letter store.
    Replay,
}

impl AuditAction {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enqueue => "enqueue",
            Self::Admit => "admit",
            Self::Complete => "complete",
            Self::Retry => "retry",
            Self::LeaseExpired => "lease_expired",
            Self::DeadLetter => "dead_letter",
            Self::Replay => "replay",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related operation.
    pub operation_id: OperationId,
    /// Priority of the operation.
    pub priority: Priority,
    /// Transition taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
///
/// Clones share one buffer.
#[derive(Debug, Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Operation ids recorded with `action`, oldest first.
    #[must_use]
    pub fn operations_with(&self, action: AuditAction) -> Vec<OperationId> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .map(|e| e.operation_id)
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    operation_id: OperationId,
    priority: Priority,
    action: AuditAction,
    detail: Option<String>,
) -> AuditEvent {
    let seq = EVENT_SEQ.fetch_add(1, Ordering::Relaxed);
    AuditEvent {
        event_id: format!("{operation_id}-{action}-{seq}"),
        operation_id,
        priority,
        action,
        created_at_ms: now_ms(),
        detail,
    }
}
