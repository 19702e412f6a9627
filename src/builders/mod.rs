//! Builders to construct the queue from configuration.

pub mod queue_builder;

pub use queue_builder::QueueBuilder;
