//! Configuration models for the admission queue and throttle.

pub mod queue;

pub use queue::{QueueConfig, ThrottleConfig, ENV_PREFIX};
