//! Tests for error types

use prometheus_agent_pool::core::{
    ConfigError, ExecutorError, Priority, SchedulerError, TaskId, ValidationError,
};

#[test]
fn test_validation_error_messages() {
    let err = ValidationError::PayloadTooLarge { size: 12, max: 10 };
    assert_eq!(format!("{}", err), "payload of 12 units exceeds the cap of 10");

    let err = ValidationError::UnknownCapability("wizard".to_string());
    assert_eq!(format!("{}", err), "unknown capability `wizard`");
}

#[test]
fn test_scheduler_error_wraps_validation_transparently() {
    let err: SchedulerError = ValidationError::EmptyCapability.into();
    assert_eq!(format!("{}", err), "capability tag must not be empty");
    assert!(matches!(err, SchedulerError::Validation(ValidationError::EmptyCapability)));
}

#[test]
fn test_config_error_names_field() {
    let err = prometheus_agent_pool::config::PoolConfig {
        max_workers: 2,
        ..Default::default()
    }
    .validate()
    .unwrap_err();
    assert_eq!(err.field(), Some("max_workers"));
    assert!(format!("{}", err).starts_with("invalid `max_workers`"));

    let err = ConfigError::Io {
        path: "agent-pool.json".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
    };
    assert_eq!(err.field(), None);
}

#[test]
fn test_executor_error_classification() {
    assert!(ExecutorError::transient("rate limited").is_transient());
    assert!(!ExecutorError::permanent("bad request").is_transient());
    assert!(!ExecutorError::UnknownCapability("x".to_string()).is_transient());

    let err = ExecutorError::Transient {
        message: "overloaded".to_string(),
        units_consumed: 40,
    };
    assert_eq!(err.units_consumed(), 40);
}

#[test]
fn test_batch_aborted_message() {
    let err = SchedulerError::BatchAborted {
        task_id: TaskId(3),
        priority: Priority::Security,
        reason: "boom".to_string(),
    };
    assert_eq!(format!("{}", err), "batch aborted: SECURITY task task-3 failed: boom");
}
