//! Tests for builder modules

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prometheus_agent_pool::builders::AgentPoolBuilder;
use prometheus_agent_pool::config::{PoolConfig, PoolConfigOverrides};
use prometheus_agent_pool::core::{InMemoryExecutor, SchedulerError, Spawn, TokenTracker};

#[derive(Clone, Default)]
struct CountingSpawner {
    spawned: Arc<AtomicUsize>,
}

impl Spawn for CountingSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(fut);
    }
}

#[test]
fn test_builder_exposes_config() {
    let config = PoolConfig {
        max_workers: 4,
        ..Default::default()
    };
    let builder = AgentPoolBuilder::new(config, InMemoryExecutor::new());
    assert_eq!(builder.config().max_workers, 4);
}

#[test]
fn test_build_outside_runtime_fails() {
    let err = AgentPoolBuilder::new(PoolConfig::default(), InMemoryExecutor::new())
        .build()
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NoRuntime(_)));
}

#[tokio::test]
async fn test_build_on_spawns_admission_and_workers() {
    let spawner = CountingSpawner::default();
    let config = PoolConfig {
        max_workers: 5,
        ..Default::default()
    };
    let pool = AgentPoolBuilder::new(config, InMemoryExecutor::new())
        .build_on(&spawner)
        .unwrap();

    assert_eq!(spawner.spawned.load(Ordering::SeqCst), 6);
    assert_eq!(pool.get_pool_status().max_workers, 5);
}

#[tokio::test]
async fn test_invalid_config_fails_construction() {
    let config = PoolConfig {
        max_workers: 2,
        ..Default::default()
    };
    let err = AgentPoolBuilder::new(config, InMemoryExecutor::new())
        .build()
        .unwrap_err();
    match err {
        SchedulerError::Config(inner) => assert_eq!(inner.field(), Some("max_workers")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_shared_tracker_is_used() {
    let tracker = Arc::new(TokenTracker::new(1_000, std::time::Duration::from_secs(60)));
    tracker.record_usage("external", 400);

    let pool = AgentPoolBuilder::new(PoolConfig::default(), InMemoryExecutor::new())
        .tracker(Arc::clone(&tracker))
        .build()
        .unwrap();
    assert_eq!(pool.get_pool_status().remaining_budget, 600);
    assert!(Arc::ptr_eq(pool.tracker(), &tracker));
}

#[test]
fn test_from_sources_applies_explicit_layer() {
    let explicit = PoolConfigOverrides {
        max_workers: Some(7),
        ..Default::default()
    };
    let builder =
        AgentPoolBuilder::from_sources(&explicit, None, InMemoryExecutor::new()).unwrap();
    assert_eq!(builder.config().max_workers, 7);
}
