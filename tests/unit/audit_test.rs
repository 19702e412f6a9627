//! Tests for audit sink

use qoms::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};
use qoms::util::serde::{OperationId, Priority};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);
    let id = OperationId::new();

    let event = build_audit_event(id, Priority::High, AuditAction::Enqueue, Some("embed".to_string()));
    sink.record(event);
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].operation_id, id);
    assert_eq!(events[0].priority, Priority::High);
    assert_eq!(events[0].action, AuditAction::Enqueue);
    assert_eq!(events[0].detail.as_deref(), Some("embed"));
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);
    let ids: Vec<_> = (0..3).map(|_| OperationId::new()).collect();

    for id in &ids {
        sink.record(build_audit_event(*id, Priority::Normal, AuditAction::Admit, None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].operation_id, ids[1]); // First one popped
    assert_eq!(events[1].operation_id, ids[2]);
}

#[test]
fn test_clones_share_events() {
    let sink = InMemoryAuditSink::new(8);
    let writer = sink.clone();
    let id = OperationId::new();

    writer.record(build_audit_event(id, Priority::Low, AuditAction::Admit, None));
    writer.record(build_audit_event(id, Priority::Low, AuditAction::Complete, None));

    assert_eq!(sink.operations_with(AuditAction::Complete), vec![id]);
    assert!(sink.operations_with(AuditAction::DeadLetter).is_empty());
}

#[test]
fn test_build_audit_event() {
    let id = OperationId::new();
    let a = build_audit_event(id, Priority::Idle, AuditAction::LeaseExpired, None);
    let b = build_audit_event(id, Priority::Idle, AuditAction::LeaseExpired, None);

    assert_ne!(a.event_id, b.event_id);
    assert!(a.event_id.contains("lease_expired"));
    assert!(a.created_at_ms > 0);
    let json = serde_json::to_value(&a).expect("serialize");
    assert_eq!(json["action"], "lease_expired");
    assert_eq!(json["priority"], "idle");
}
