//! Tests for audit sink

use std::sync::Arc;

use parking_lot::Mutex;
use prometheus_agent_pool::core::{
    build_audit_event, AuditAction, AuditSink, InMemoryAuditSink, TaskId, WorkerId,
};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        Some(TaskId(1)),
        Some(WorkerId(0)),
        AuditAction::Started,
        Some("payload".to_string()),
    );

    sink.record(event);
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].task_id, Some(TaskId(1)));
    assert_eq!(events[0].worker_id, Some(WorkerId(0)));
    assert_eq!(events[0].action, AuditAction::Started);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(Some(TaskId(1)), None, AuditAction::Submitted, None));
    sink.record(build_audit_event(Some(TaskId(2)), None, AuditAction::Submitted, None));
    sink.record(build_audit_event(Some(TaskId(3)), None, AuditAction::Submitted, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].task_id, Some(TaskId(2))); // First one popped
    assert_eq!(events[1].task_id, Some(TaskId(3)));
}

#[test]
fn test_zero_capacity_sink_drops_everything() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event(None, None, AuditAction::Rejected, None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_shared_sink_records_through_arc() {
    let shared = Arc::new(Mutex::new(InMemoryAuditSink::new(4)));
    let mut writer = Arc::clone(&shared);
    writer.record(build_audit_event(Some(TaskId(7)), None, AuditAction::Cancelled, None));

    let events = shared.lock().events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::Cancelled);
}

#[test]
fn test_build_audit_event() {
    let event = build_audit_event(
        Some(TaskId(9)),
        Some(WorkerId(2)),
        AuditAction::Completed,
        Some("result".to_string()),
    );

    assert_eq!(event.action.to_string(), "completed");
    assert_eq!(event.detail, Some("result".to_string()));
    assert!(event.created_at_ms > 0);

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["action"], "completed");
    assert_eq!(json["task_id"], 9);
}
