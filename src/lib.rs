//! # QOMS
//!
//! A resource-aware, priority-ordered admission queue for in-process
//! asynchronous work.
//!
//! Callers hand the queue a repeatable async action and a priority. The queue
//! holds the action in one of five FIFO lanes and only starts it while CPU and
//! RAM utilization stay under configured limits. Started work is leased; work
//! that fails or whose lease runs out is retried with exponential backoff and
//! dead-lettered once its retry budget is spent. Long-waiting work is aged
//! toward higher priority so low lanes are never starved.
//!
//! ## Key Features
//!
//! - **Resource Gating**: admission pauses while the sampled CPU or RAM
//!   utilization is at or above its limit
//! - **Priority Lanes**: `Critical`, `High`, `Normal`, `Low`, `Idle`, FIFO within each
//! - **Aging**: one level of promotion per elapsed aging threshold
//! - **Leases**: silent hangs are detected and retried; heartbeats extend a lease
//! - **Retries and Dead Letters**: bounded exponential backoff, inspectable and replayable DLQ
//! - **Advisory Backpressure**: a high-water mark raises a warning, never rejects work
//!
//! ```rust,ignore
//! use qoms::builders::QueueBuilder;
//! use qoms::config::QueueConfig;
//! use qoms::util::serde::Priority;
//!
//! let queue = QueueBuilder::new(QueueConfig::from_env()?).build()?;
//!
//! let embedding = queue
//!     .enqueue_named("embed", Priority::High, || async { embed("query").await })
//!     .await?;
//!
//! let stats = queue.stats().await?;
//! tracing::info!(queued = stats.total_queued, in_flight = stats.in_flight, "queue state");
//! ```
//!
//! Errors that must not be retried are marked with
//! [`PermanentFailure`](crate::core::PermanentFailure); everything else an action
//! returns is treated as transient.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Scheduling core: lanes, leases, retries, and the admission loop.
pub mod core;
/// Configuration models for the queue and throttle.
pub mod config;
/// Builders to construct the queue from configuration.
pub mod builders;
/// Infrastructure adapters for system telemetry.
pub mod infra;
/// Runtime adapters.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::builders::QueueBuilder;
pub use crate::config::QueueConfig;
pub use crate::core::{
    OperationHandle, OperationQueue, PermanentFailure, QueueError, QueueStats, ResourceProbe,
};
pub use crate::util::serde::{OperationId, Priority};
