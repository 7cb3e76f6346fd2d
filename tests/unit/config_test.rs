//! Tests for configuration validation and layering

use std::fs;

use prometheus_agent_pool::config::{PoolConfig, PoolConfigOverrides, PROJECT_DOCUMENT};
use prometheus_agent_pool::core::ConfigError;

#[test]
fn test_pool_config_validation() {
    assert!(PoolConfig::default().validate().is_ok());
}

#[test]
fn test_pool_config_invalid_max_workers() {
    for workers in [0, 2, 13] {
        let invalid = PoolConfig {
            max_workers: workers,
            ..Default::default()
        };
        let err = invalid.validate().unwrap_err();
        assert_eq!(err.field(), Some("max_workers"), "max_workers = {workers}");
    }
}

#[test]
fn test_pool_config_invalid_budget_and_window() {
    let invalid = PoolConfig {
        token_budget: 0,
        ..Default::default()
    };
    assert_eq!(invalid.validate().unwrap_err().field(), Some("token_budget"));

    let invalid = PoolConfig {
        window_seconds: 0,
        ..Default::default()
    };
    assert_eq!(invalid.validate().unwrap_err().field(), Some("window_seconds"));
}

#[test]
fn test_pool_config_invalid_local_depth_and_capabilities() {
    let invalid = PoolConfig {
        local_queue_depth: 3,
        ..Default::default()
    };
    assert_eq!(invalid.validate().unwrap_err().field(), Some("local_queue_depth"));

    let invalid = PoolConfig {
        allowed_capabilities: Vec::new(),
        ..Default::default()
    };
    assert_eq!(invalid.validate().unwrap_err().field(), Some("allowed_capabilities"));
}

#[test]
fn test_explicit_beats_env_beats_document() {
    let document = PoolConfigOverrides {
        max_workers: Some(4),
        token_budget: Some(50_000),
        window_seconds: Some(30),
        ..Default::default()
    };
    let env = PoolConfigOverrides {
        max_workers: Some(5),
        token_budget: Some(60_000),
        ..Default::default()
    };
    let explicit = PoolConfigOverrides {
        max_workers: Some(8),
        ..Default::default()
    };

    let config = PoolConfig::resolve(&explicit, &env, Some(&document)).unwrap();
    assert_eq!(config.max_workers, 8);
    assert_eq!(config.token_budget, 60_000);
    assert_eq!(config.window_seconds, 30);
    assert_eq!(config.task_timeout_secs, PoolConfig::default().task_timeout_secs);
}

#[test]
fn test_resolve_validates_merged_result() {
    let env = PoolConfigOverrides::from_env_vars([("AGENT_POOL_MAX_WORKERS", "20")]).unwrap();
    let err = PoolConfig::resolve(&PoolConfigOverrides::default(), &env, None).unwrap_err();
    assert_eq!(err.field(), Some("max_workers"));
}

#[test]
fn test_env_parse_failure_names_field() {
    let err = PoolConfigOverrides::from_env_vars([("AGENT_POOL_TOKEN_BUDGET", "lots")]).unwrap_err();
    assert_eq!(err.field(), Some("token_budget"));
}

#[test]
fn test_env_retry_overrides() {
    let env = PoolConfigOverrides::from_env_vars([
        ("AGENT_POOL_MAX_RETRIES", "5"),
        ("AGENT_POOL_BACKOFF_BASE_MS", "250"),
    ])
    .unwrap();
    let config = PoolConfig::resolve(&PoolConfigOverrides::default(), &env, None).unwrap();
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.base_delay_ms, 250);
}

#[test]
fn test_load_reads_project_document() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(PROJECT_DOCUMENT),
        r#"{ "token_budget": 25000, "lookahead": 3, "fail_fast": true }"#,
    )
    .unwrap();

    let explicit = PoolConfigOverrides {
        lookahead: Some(5),
        ..Default::default()
    };
    let config = PoolConfig::load(&explicit, Some(dir.path())).unwrap();
    assert_eq!(config.lookahead, 5);
    assert!(config.fail_fast);
    // The environment may override the budget on a developer machine.
    if std::env::var("AGENT_POOL_TOKEN_BUDGET").is_err() {
        assert_eq!(config.token_budget, 25_000);
    }
}

#[test]
fn test_document_rejects_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(PROJECT_DOCUMENT);
    fs::write(&path, r#"{ "max_wrokers": 4 }"#).unwrap();

    let err = PoolConfigOverrides::from_document(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_missing_document_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = PoolConfigOverrides::from_document(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_duration_helpers() {
    let config = PoolConfig::default();
    assert_eq!(config.window().as_secs(), 60);
    assert_eq!(config.task_timeout().as_secs(), 300);
    assert_eq!(config.queue_wait_timeout().as_secs(), 900);
    assert_eq!(config.effective_workers(), 6);
}
