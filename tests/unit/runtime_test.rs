//! Tests for tokio spawner utilities and the API layer

use std::time::Duration;

use prometheus_agent_pool::config::PoolConfig;
use prometheus_agent_pool::core::{AgentPool, InMemoryExecutor, Priority, Spawn, TaskState};
use prometheus_agent_pool::runtime::api::{
    health, status_json, submit_json, submit_task, task_status, TaskSubmission,
};
use prometheus_agent_pool::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[test]
fn test_current_spawner_needs_runtime() {
    assert!(TokioSpawner::current().is_err());
}

#[test]
fn test_submission_into_spec() {
    let req: TaskSubmission = serde_json::from_str(
        r#"{ "capability": "test-runner", "payload": "cargo test", "priority": "tests", "timeout_secs": 30 }"#,
    )
    .unwrap();
    assert_eq!(req.priority, Priority::Tests);
    assert_eq!(req.estimated_tokens, None);

    let spec: prometheus_agent_pool::core::TaskSpec = req.into();
    assert_eq!(spec.timeout, Some(Duration::from_secs(30)));
}

#[tokio::test]
async fn test_api_round_trip() {
    let pool = AgentPool::new(PoolConfig::default(), InMemoryExecutor::new()).unwrap();

    let handle = submit_task(
        &pool,
        TaskSubmission {
            capability: "doc-writer".to_string(),
            payload: "changelog".to_string(),
            priority: Priority::Docs,
            estimated_tokens: Some(100),
            timeout_secs: None,
        },
    )
    .unwrap();
    let result = handle.wait().await;
    assert!(result.success);

    let status = task_status(&handle);
    assert_eq!(status.state, TaskState::Completed);
    assert_eq!(status.result.unwrap().output.as_deref(), Some("doc-writer:changelog"));

    let json: serde_json::Value = serde_json::from_str(&status_json(&pool).unwrap()).unwrap();
    assert_eq!(json["counters"]["completed"], 1);

    let report = health(&pool);
    assert!(report.ok);
    assert!(report.accepting);
}

#[tokio::test]
async fn test_submit_json_reports_context() {
    let pool = AgentPool::new(PoolConfig::default(), InMemoryExecutor::new()).unwrap();

    let err = submit_json(&pool, "{ not json").unwrap_err();
    assert!(err.to_string().contains("failed to parse task submission"));

    let err = submit_json(
        &pool,
        r#"{ "capability": "wizard", "payload": "x", "priority": "optional" }"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("failed to submit `wizard` task"));

    pool.shutdown();
    assert!(!health(&pool).ok);
}
