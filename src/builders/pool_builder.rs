//! Builder to construct an agent pool from configuration.

use std::path::Path;
use std::sync::Arc;

use crate::config::{PoolConfig, PoolConfigOverrides};
use crate::core::{AgentPool, AuditSink, ConfigError, Executor, SchedulerError, Spawn, TokenTracker};
use crate::runtime::TokioSpawner;

/// Assembles an [`AgentPool`] from a resolved config, an executor and
/// optional collaborators.
pub struct AgentPoolBuilder {
    config: PoolConfig,
    executor: Arc<dyn Executor>,
    tracker: Option<Arc<TokenTracker>>,
    audit: Option<Box<dyn AuditSink>>,
}

impl AgentPoolBuilder {
    /// Start from an already resolved configuration.
    pub fn new<E: Executor>(config: PoolConfig, executor: E) -> Self {
        Self::with_shared_executor(config, Arc::new(executor))
    }

    /// Like [`AgentPoolBuilder::new`], for an executor that is already shared.
    #[must_use]
    pub fn with_shared_executor(config: PoolConfig, executor: Arc<dyn Executor>) -> Self {
        Self {
            config,
            executor,
            tracker: None,
            audit: None,
        }
    }

    /// Resolve configuration from explicit overrides, the environment and the
    /// project document in `project_dir`.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] raised while reading or validating the layers.
    pub fn from_sources<E: Executor>(
        explicit: &PoolConfigOverrides,
        project_dir: Option<&Path>,
        executor: E,
    ) -> Result<Self, ConfigError> {
        let config = PoolConfig::load(explicit, project_dir)?;
        Ok(Self::new(config, executor))
    }

    /// Share an existing tracker instead of creating one from the config.
    ///
    /// The tracker's own budget and window are used for admission.
    #[must_use]
    pub fn tracker(mut self, tracker: Arc<TokenTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Record lifecycle events to `sink`.
    #[must_use]
    pub fn audit(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Some(Box::new(sink));
        self
    }

    /// Configuration the pool will run with.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Launch the pool on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NoRuntime`] outside a runtime, or
    /// [`SchedulerError::Config`] for an invalid configuration.
    pub fn build(self) -> Result<AgentPool, SchedulerError> {
        let spawner = TokioSpawner::current()?;
        self.build_on(&spawner)
    }

    /// Launch the pool's loops through `spawner`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Config`] for an invalid configuration.
    pub fn build_on<S: Spawn>(self, spawner: &S) -> Result<AgentPool, SchedulerError> {
        let tracker = self
            .tracker
            .unwrap_or_else(|| Arc::new(TokenTracker::from_config(&self.config)));
        AgentPool::launch(self.config, tracker, self.executor, self.audit, spawner)
    }
}

impl std::fmt::Debug for AgentPoolBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPoolBuilder")
            .field("config", &self.config)
            .field("shared_tracker", &self.tracker.is_some())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}
