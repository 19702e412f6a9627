//! Retry policy and the coordinator that applies it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::QueueConfig;
use crate::core::dead_letter::{DeadLetterEntry, DeadLetterReason, DeadLetterStore};
use crate::core::error::QueueError;
use crate::core::executor::Job;
use crate::core::operation::Operation;
use crate::util::clock::now_ms;

/// How an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The action returned a retryable error.
    Transient,
    /// The lease ran out before the attempt reported back.
    LeaseExpired,
    /// The action returned a permanent failure.
    Terminal,
}

/// What to do with a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue after `delay` with `retry_count` as the new count.
    Retry {
        /// Retry count after this failure.
        retry_count: u32,
        /// Time to park before re-entering the lane.
        delay: Duration,
    },
    /// Give up and dead-letter.
    DeadLetter(DeadLetterReason),
}

/// Exponential backoff with a retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed before dead-lettering.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy from queue configuration.
    #[must_use]
    pub const fn from_config(cfg: &QueueConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.base_retry_delay_ms),
            max_delay: Duration::from_millis(cfg.max_retry_delay_ms),
        }
    }

    /// `min(base * 2^retry_count, max)`.
    #[must_use]
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let factor = 1_u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Decide the fate of an operation that has already retried
    /// `retry_count` times. Lease expiries re-enter their lane immediately.
    #[must_use]
    pub fn decide(&self, kind: FailureKind, retry_count: u32) -> RetryDecision {
        match kind {
            FailureKind::Terminal => RetryDecision::DeadLetter(DeadLetterReason::Permanent),
            _ if retry_count >= self.max_retries => {
                RetryDecision::DeadLetter(DeadLetterReason::RetriesExhausted)
            }
            FailureKind::LeaseExpired => RetryDecision::Retry {
                retry_count: retry_count + 1,
                delay: Duration::ZERO,
            },
            FailureKind::Transient => RetryDecision::Retry {
                retry_count: retry_count + 1,
                delay: self.backoff_delay(retry_count),
            },
        }
    }
}

/// Where a failed operation goes next.
#[derive(Debug)]
pub enum Resolution {
    /// Back to the tail of its lane now.
    Requeue(Operation),
    /// Park in a timer, then back to the tail of its lane.
    Park {
        /// The operation to park.
        operation: Operation,
        /// Backoff delay.
        delay: Duration,
    },
    /// Dead-lettered; the caller has been rejected.
    DeadLettered(DeadLetterEntry),
}

/// Applies [`RetryPolicy`] and owns the dead letter store.
///
/// The coordinator is the only component that increments retry counts or
/// writes dead letters.
pub struct RetryCoordinator {
    policy: RetryPolicy,
    dead_letters: DeadLetterStore<Arc<dyn Job>>,
    total_retries: u64,
    total_dead_lettered: u64,
}

impl RetryCoordinator {
    /// Create a coordinator from configuration.
    #[must_use]
    pub fn new(cfg: &QueueConfig) -> Self {
        Self {
            policy: RetryPolicy::from_config(cfg),
            dead_letters: DeadLetterStore::new(cfg.dlq_max_size, cfg.dlq_retention()),
            total_retries: 0,
            total_dead_lettered: 0,
        }
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record a failure and resolve the operation's next state.
    pub fn on_failure(
        &mut self,
        mut operation: Operation,
        kind: FailureKind,
        error: anyhow::Error,
        now: Instant,
    ) -> Resolution {
        let message = format!("{error:#}");
        operation.last_error = Some(message.clone());

        match self.policy.decide(kind, operation.retry_count) {
            RetryDecision::Retry { retry_count, delay } => {
                operation.retry_count = retry_count;
                self.total_retries += 1;
                tracing::info!(
                    id = %operation.id(),
                    priority = %operation.priority(),
                    retry = retry_count,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %message,
                    "scheduling retry"
                );
                if delay.is_zero() {
                    Resolution::Requeue(operation)
                } else {
                    Resolution::Park { operation, delay }
                }
            }
            RetryDecision::DeadLetter(reason) => {
                let entry = DeadLetterEntry {
                    id: operation.id(),
                    priority: operation.priority(),
                    name: operation.name().map(str::to_owned),
                    enqueued_at_ms: operation.enqueued_at_ms(),
                    failed_at_ms: now_ms(),
                    retry_count: operation.retry_count,
                    last_error: message,
                    reason,
                };
                tracing::warn!(
                    id = %entry.id,
                    priority = %entry.priority,
                    retries = entry.retry_count,
                    %reason,
                    error = %entry.last_error,
                    "operation dead-lettered"
                );
                let rejection = match reason {
                    DeadLetterReason::RetriesExhausted => QueueError::RetriesExhausted {
                        id: entry.id,
                        retries: entry.retry_count,
                        source: error,
                    },
                    DeadLetterReason::Permanent => QueueError::Rejected {
                        id: entry.id,
                        source: error,
                    },
                };
                operation.job.reject(rejection);
                self.total_dead_lettered += 1;
                self.dead_letters
                    .add(entry.clone(), Arc::clone(&operation.job), now);
                Resolution::DeadLettered(entry)
            }
        }
    }

    /// Dead letter store.
    pub(crate) fn dead_letters(&mut self) -> &mut DeadLetterStore<Arc<dyn Job>> {
        &mut self.dead_letters
    }

    /// Entries currently stored.
    #[must_use]
    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.len()
    }

    /// Retries scheduled since start.
    #[must_use]
    pub const fn total_retries(&self) -> u64 {
        self.total_retries
    }

    /// Operations dead-lettered since start.
    #[must_use]
    pub const fn total_dead_lettered(&self) -> u64 {
        self.total_dead_lettered
    }
}
