//! Infrastructure adapters for system telemetry.

pub mod probe;

pub use probe::{ManualProbe, ProcfsProbe};
