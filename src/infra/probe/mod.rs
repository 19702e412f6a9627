//! Telemetry probes.

pub mod manual;
pub mod procfs;

pub use manual::ManualProbe;
pub use procfs::ProcfsProbe;
