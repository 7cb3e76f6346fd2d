//! Tests for utility functions and task model helpers

use std::time::Duration;

use prometheus_agent_pool::core::{Priority, TaskId, TaskSpec, TaskState, WorkerId};
use prometheus_agent_pool::util::{init_test_tracing, now_ms};

#[test]
fn test_priority_ordering() {
    assert!(Priority::Security > Priority::Tests);
    assert!(Priority::Tests > Priority::Docs);
    assert!(Priority::Docs > Priority::Optional);
    assert_eq!(Priority::ALL[0], Priority::Security);
}

#[test]
fn test_priority_serde_names() {
    assert_eq!(serde_json::to_string(&Priority::Security).unwrap(), "\"security\"");
    let parsed: Priority = serde_json::from_str("\"docs\"").unwrap();
    assert_eq!(parsed, Priority::Docs);
}

#[test]
fn test_ids_display() {
    assert_eq!(TaskId(42).to_string(), "task-42");
    assert_eq!(WorkerId(3).to_string(), "worker-3");
}

#[test]
fn test_task_spec_builder() {
    let spec = TaskSpec::new("doc-writer", "readme", Priority::Docs)
        .with_estimated_tokens(1_500)
        .with_timeout(Duration::from_secs(5));
    assert_eq!(spec.estimated_tokens, Some(1_500));
    assert_eq!(spec.timeout, Some(Duration::from_secs(5)));
}

#[test]
fn test_terminal_states() {
    assert!(TaskState::TimedOut.is_terminal());
    assert!(!TaskState::Admitted.is_terminal());
}

#[test]
fn test_clock_and_tracing() {
    init_test_tracing();
    init_test_tracing();
    assert!(now_ms() > 0);
}
