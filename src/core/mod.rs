//! Scheduling core: lanes, leases, retries, and the admission loop.

pub mod audit;
pub mod controller;
pub mod dead_letter;
pub mod error;
pub mod executor;
pub mod lane;
pub mod lease;
pub mod operation;
pub mod queue;
pub mod retry;
pub mod sampler;
pub mod stats;
pub mod throttle;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use controller::{effective_level, select_lane};
pub use dead_letter::{DeadLetterEntry, DeadLetterReason, DeadLetterStore};
pub use error::{AppResult, PermanentFailure, QueueError};
pub use executor::{BoxFuture, Outcome, Spawn};
pub use lane::{LaneEntry, LaneSet, PriorityLane};
pub use lease::{Lease, LeaseTracker};
pub use operation::Operation;
pub use queue::{OperationHandle, OperationQueue};
pub use retry::{FailureKind, Resolution, RetryCoordinator, RetryDecision, RetryPolicy};
pub use sampler::{ProbeError, ResourceProbe, ResourceReading, ResourceSampler, ResourceSnapshot};
pub use stats::{QueueLimits, QueueStats};
pub use throttle::{cpu_multiplier, Throttle};
