//! Tests for utility functions

use qoms::util::{init_tracing, now_ms, OperationId, Priority};

#[test]
fn test_priority_levels() {
    assert_eq!(Priority::Critical.level(), 0);
    assert_eq!(Priority::Idle.level(), 4);
    for p in Priority::ALL {
        assert_eq!(Priority::from_level(p.level()), Some(p));
    }
    assert_eq!(Priority::from_level(5), None);
    assert_eq!(Priority::default(), Priority::Normal);
}

#[test]
fn test_priority_promotion_saturates() {
    assert_eq!(Priority::Low.promoted_level(1), 2);
    assert_eq!(Priority::Low.promoted_level(10), 0);
    assert_eq!(Priority::Critical.promoted_level(1), 0);
}

#[test]
fn test_priority_serde_names() {
    let json = serde_json::to_string(&Priority::Critical).expect("serialize");
    assert_eq!(json, "\"critical\"");
    let parsed: Priority = serde_json::from_str("\"idle\"").expect("deserialize");
    assert_eq!(parsed, Priority::Idle);
    assert_eq!(Priority::Low.to_string(), "low");
}

#[test]
fn test_operation_ids_are_unique() {
    let a = OperationId::new();
    let b = OperationId::new();
    assert_ne!(a, b);
    assert!(a.to_string().starts_with("op-"));

    let json = serde_json::to_string(&a).expect("serialize");
    let back: OperationId = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(a, back);
}

#[test]
fn test_now_ms_is_after_epoch() {
    assert!(now_ms() > 1_600_000_000_000);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!("tracing initialised twice without panicking");
}
