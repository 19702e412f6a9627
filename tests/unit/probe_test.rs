//! Tests for telemetry probes

use qoms::core::{ProbeError, ResourceProbe, ResourceReading};
use qoms::infra::probe::procfs::{parse_cpu_times, parse_loadavg, parse_meminfo};
use qoms::infra::{ManualProbe, ProcfsProbe};

#[test]
fn test_manual_probe_updates() {
    let probe = ManualProbe::new(10.0, 20.0);
    let shared = probe.clone();

    shared.set_cpu(80.0);
    shared.set_ram(30.0);
    let reading = probe.read().expect("reading");
    assert!((reading.cpu_percent - 80.0).abs() < f64::EPSILON);
    assert!((reading.ram_percent - 30.0).abs() < f64::EPSILON);

    shared.set_reading(ResourceReading {
        cpu_percent: 1.0,
        ram_percent: 2.0,
        free_ram_bytes: 3,
        total_ram_bytes: 4,
        load_avg_1m: 0.5,
        cpu_count: 8,
    });
    assert_eq!(probe.read().expect("reading").cpu_count, 8);
    assert_eq!(probe.reads(), 2);
}

#[test]
fn test_manual_probe_failure_mode() {
    let probe = ManualProbe::default();
    probe.set_failing(true);
    assert!(matches!(probe.read(), Err(ProbeError::Unavailable(_))));
    probe.set_failing(false);
    assert!(probe.read().is_ok());
}

#[test]
fn test_procfs_parsers_reject_garbage() {
    assert!(parse_cpu_times("intr 1 2 3\n").is_err());
    assert!(parse_cpu_times("cpu  a b c d\n").is_err());
    assert!(parse_meminfo("MemFree: 10 kB\n").is_err());
    assert!(parse_loadavg("x.y 1 2").is_err());
}

#[test]
fn test_procfs_missing_root_is_io_error() {
    let probe = ProcfsProbe::with_root("/nonexistent/qoms-proc");
    assert!(matches!(probe.read(), Err(ProbeError::Io(_))));
}

#[cfg(target_os = "linux")]
#[test]
fn test_procfs_reads_host() {
    let probe = ProcfsProbe::new();
    let reading = probe.read().expect("procfs readable on linux");
    assert!(reading.total_ram_bytes > 0);
    assert!((0.0..=100.0).contains(&reading.ram_percent));
    assert!(reading.cpu_count >= 1);
}
