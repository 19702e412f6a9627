//! Tests for configuration validation

use qoms::config::{QueueConfig, ThrottleConfig};

#[test]
fn test_default_config_is_valid() {
    let cfg = QueueConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.max_retries, 3);
    assert_eq!(cfg.high_water_mark, 100);
    assert_eq!(cfg.aging_threshold().as_secs(), 30);
    assert_eq!(cfg.lease_timeout().as_secs(), 60);
}

#[test]
fn test_percent_limits_validated() {
    let zero_cpu = QueueConfig {
        max_cpu_percent: 0.0,
        ..QueueConfig::default()
    };
    assert!(zero_cpu.validate().is_err());

    let over_ram = QueueConfig {
        max_ram_percent: 100.5,
        ..QueueConfig::default()
    };
    assert!(over_ram.validate().is_err());
}

#[test]
fn test_retry_delays_validated() {
    let invalid = QueueConfig {
        base_retry_delay_ms: 5_000,
        max_retry_delay_ms: 1_000,
        ..QueueConfig::default()
    };
    let err = invalid.validate().expect_err("base above max");
    assert!(err.contains("base_retry_delay_ms"));
}

#[test]
fn test_zero_sizes_rejected() {
    for cfg in [
        QueueConfig {
            tick_interval_ms: 0,
            ..QueueConfig::default()
        },
        QueueConfig {
            dlq_max_size: 0,
            ..QueueConfig::default()
        },
        QueueConfig {
            high_water_mark: 0,
            ..QueueConfig::default()
        },
        QueueConfig {
            max_in_flight: Some(0),
            ..QueueConfig::default()
        },
    ] {
        assert!(cfg.validate().is_err(), "{cfg:?} should be invalid");
    }
}

#[test]
fn test_throttle_validation() {
    let invalid = ThrottleConfig {
        max_requests_per_second: 0.0,
        ..ThrottleConfig::default()
    };
    assert!(invalid.validate().is_err());

    let cfg = QueueConfig {
        throttle: ThrottleConfig {
            burst_limit: 0,
            ..ThrottleConfig::default()
        },
        ..QueueConfig::default()
    };
    assert!(cfg.validate().unwrap_err().starts_with("throttle invalid"));
}

#[test]
fn test_from_json_partial() {
    let cfg = QueueConfig::from_json_str(
        r#"{"max_cpu_percent": 90.0, "max_in_flight": 4, "throttle": {"burst_limit": 3}}"#,
    )
    .expect("valid json");
    assert!((cfg.max_cpu_percent - 90.0).abs() < f64::EPSILON);
    assert_eq!(cfg.max_in_flight, Some(4));
    assert_eq!(cfg.throttle.burst_limit, 3);
    assert_eq!(cfg.throttle.base_delay_ms, 50);
    assert_eq!(cfg.max_retries, 3);
}

#[test]
fn test_from_json_rejects_invalid_values() {
    assert!(QueueConfig::from_json_str(r#"{"max_cpu_percent": 150.0}"#).is_err());
    assert!(QueueConfig::from_json_str("not json").is_err());
}

#[test]
fn test_from_vars_overrides() {
    let cfg = QueueConfig::from_vars([
        ("QOMS_MAX_RETRIES", "5"),
        ("QOMS_LEASE_TIMEOUT_MS", "1500"),
        ("QOMS_MAX_IN_FLIGHT", "2"),
        ("QOMS_THROTTLE_BURST_LIMIT", "7"),
        ("QOMS_UNKNOWN_KNOB", "1"),
        ("PATH", "/usr/bin"),
    ])
    .expect("valid overrides");
    assert_eq!(cfg.max_retries, 5);
    assert_eq!(cfg.lease_timeout_ms, 1_500);
    assert_eq!(cfg.max_in_flight, Some(2));
    assert_eq!(cfg.throttle.burst_limit, 7);
}

#[test]
fn test_from_vars_reports_bad_values() {
    let err = QueueConfig::from_vars([("QOMS_MAX_RETRIES", "many")]).expect_err("bad number");
    assert!(err.contains("QOMS_MAX_RETRIES"));

    let err = QueueConfig::from_vars([("QOMS_MAX_RAM_PERCENT", "0")]).expect_err("out of range");
    assert!(err.contains("max_ram_percent"));
}
