//! Pool configuration: defaults, layered overrides and validation.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigError;
use crate::core::retry::RetryPolicy;

/// Smallest allowed worker count.
pub const MIN_WORKERS: usize = 3;
/// Largest allowed worker count; also a hard cap applied by the pool.
pub const MAX_WORKERS: usize = 12;
/// Deepest allowed per-worker prefetch queue.
pub const MAX_LOCAL_QUEUE_DEPTH: usize = 2;
/// Longest accepted window, task timeout or queue wait, in seconds (one week).
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;
/// File name of the project-level config document.
pub const PROJECT_DOCUMENT: &str = "agent-pool.json";
/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "AGENT_POOL_";

/// Capability tags accepted when no allow-list is configured.
pub const DEFAULT_CAPABILITIES: &[&str] = &[
    "security-reviewer",
    "test-runner",
    "doc-writer",
    "code-reviewer",
    "general-purpose",
];

/// Scheduler parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Concurrent worker count, within `[3, 12]`.
    pub max_workers: usize,
    /// Tokens admissible per sliding window.
    pub token_budget: u64,
    /// Sliding window length in seconds.
    pub window_seconds: u64,
    /// Default per-attempt deadline in seconds.
    pub task_timeout_secs: u64,
    /// How long a task may stay pending before failing, in seconds.
    pub queue_wait_timeout_secs: u64,
    /// Maximum payload size in characters.
    pub max_payload_units: usize,
    /// Same-class tasks scanned when the head does not fit the budget.
    pub lookahead: usize,
    /// Prefetched tasks per worker, at most 2.
    pub local_queue_depth: usize,
    /// Let idle workers take prefetched tasks from busy ones.
    pub work_stealing: bool,
    /// Estimate used when a submission does not carry one.
    pub default_estimated_tokens: u64,
    /// Abort a batch when a top-priority task fails.
    pub fail_fast: bool,
    /// Accepted capability tags.
    pub allowed_capabilities: Vec<String>,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 6,
            token_budget: 150_000,
            window_seconds: 60,
            task_timeout_secs: 300,
            queue_wait_timeout_secs: 900,
            max_payload_units: 10_000,
            lookahead: 8,
            local_queue_depth: MAX_LOCAL_QUEUE_DEPTH,
            work_stealing: true,
            default_estimated_tokens: 4_000,
            fail_fast: false,
            allowed_capabilities: DEFAULT_CAPABILITIES.iter().map(ToString::to_string).collect(),
            retry: RetryPolicy::default(),
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration values. Pure; reports the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.max_workers) {
            return Err(ConfigError::invalid(
                "max_workers",
                format!(
                    "must be within [{MIN_WORKERS}, {MAX_WORKERS}], got {}",
                    self.max_workers
                ),
            ));
        }
        if self.token_budget == 0 {
            return Err(ConfigError::invalid("token_budget", "must be greater than 0"));
        }
        if self.window_seconds == 0 {
            return Err(ConfigError::invalid("window_seconds", "must be greater than 0"));
        }
        if self.task_timeout_secs == 0 {
            return Err(ConfigError::invalid("task_timeout_secs", "must be greater than 0"));
        }
        if self.queue_wait_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "queue_wait_timeout_secs",
                "must be greater than 0",
            ));
        }
        for (field, secs) in [
            ("window_seconds", self.window_seconds),
            ("task_timeout_secs", self.task_timeout_secs),
            ("queue_wait_timeout_secs", self.queue_wait_timeout_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(ConfigError::invalid(
                    field,
                    format!("must be at most {MAX_DURATION_SECS}, got {secs}"),
                ));
            }
        }
        if self.max_payload_units == 0 {
            return Err(ConfigError::invalid("max_payload_units", "must be greater than 0"));
        }
        if self.local_queue_depth > MAX_LOCAL_QUEUE_DEPTH {
            return Err(ConfigError::invalid(
                "local_queue_depth",
                format!(
                    "must be at most {MAX_LOCAL_QUEUE_DEPTH}, got {}",
                    self.local_queue_depth
                ),
            ));
        }
        if self.allowed_capabilities.is_empty() {
            return Err(ConfigError::invalid(
                "allowed_capabilities",
                "at least one capability must be allowed",
            ));
        }
        self.retry.validate()
    }

    /// Window length.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Default per-attempt deadline.
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Maximum time a task may stay pending.
    #[must_use]
    pub const fn queue_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_wait_timeout_secs)
    }

    /// Worker count after the hard cap.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.max_workers.min(MAX_WORKERS)
    }

    /// Apply layers in ascending precedence and validate once.
    ///
    /// Precedence: `explicit` > `env` > `document` > defaults.
    pub fn resolve(
        explicit: &PoolConfigOverrides,
        env: &PoolConfigOverrides,
        document: Option<&PoolConfigOverrides>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(document) = document {
            document.apply_to(&mut config);
        }
        env.apply_to(&mut config);
        explicit.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Resolve from explicit overrides, the process environment (including a
    /// `.env` file) and `agent-pool.json` in `project_dir` if present.
    pub fn load(
        explicit: &PoolConfigOverrides,
        project_dir: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let env = PoolConfigOverrides::from_env()?;
        let document = match project_dir {
            Some(dir) => {
                let path = dir.join(PROJECT_DOCUMENT);
                if path.exists() {
                    Some(PoolConfigOverrides::from_document(&path)?)
                } else {
                    tracing::debug!(path = %path.display(), "no project config document");
                    None
                }
            }
            None => None,
        };
        let config = Self::resolve(explicit, &env, document.as_ref())?;
        tracing::info!(
            max_workers = config.max_workers,
            token_budget = config.token_budget,
            window_seconds = config.window_seconds,
            "pool configuration resolved"
        );
        Ok(config)
    }
}

/// One configuration layer. Unset fields fall through to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfigOverrides {
    /// See [`PoolConfig::max_workers`].
    pub max_workers: Option<usize>,
    /// See [`PoolConfig::token_budget`].
    pub token_budget: Option<u64>,
    /// See [`PoolConfig::window_seconds`].
    pub window_seconds: Option<u64>,
    /// See [`PoolConfig::task_timeout_secs`].
    pub task_timeout_secs: Option<u64>,
    /// See [`PoolConfig::queue_wait_timeout_secs`].
    pub queue_wait_timeout_secs: Option<u64>,
    /// See [`PoolConfig::max_payload_units`].
    pub max_payload_units: Option<usize>,
    /// See [`PoolConfig::lookahead`].
    pub lookahead: Option<usize>,
    /// See [`PoolConfig::local_queue_depth`].
    pub local_queue_depth: Option<usize>,
    /// See [`PoolConfig::work_stealing`].
    pub work_stealing: Option<bool>,
    /// See [`PoolConfig::default_estimated_tokens`].
    pub default_estimated_tokens: Option<u64>,
    /// See [`PoolConfig::fail_fast`].
    pub fail_fast: Option<bool>,
    /// See [`PoolConfig::allowed_capabilities`].
    pub allowed_capabilities: Option<Vec<String>>,
    /// See [`RetryPolicy::max_retries`].
    pub max_retries: Option<u32>,
    /// See [`RetryPolicy::base_delay_ms`].
    pub backoff_base_ms: Option<u64>,
    /// See [`RetryPolicy::multiplier`].
    pub backoff_multiplier: Option<f64>,
    /// See [`RetryPolicy::max_delay_ms`].
    pub backoff_max_ms: Option<u64>,
    /// See [`RetryPolicy::jitter`].
    pub backoff_jitter: Option<f64>,
}

macro_rules! apply_fields {
    ($src:expr, $dst:expr, [$($field:ident),* $(,)?]) => {
        $(
            if let Some(value) = $src.$field.clone() {
                $dst.$field = value;
            }
        )*
    };
}

impl PoolConfigOverrides {
    /// Write every set field into `config`.
    pub fn apply_to(&self, config: &mut PoolConfig) {
        apply_fields!(
            self,
            config,
            [
                max_workers,
                token_budget,
                window_seconds,
                task_timeout_secs,
                queue_wait_timeout_secs,
                max_payload_units,
                lookahead,
                local_queue_depth,
                work_stealing,
                default_estimated_tokens,
                fail_fast,
                allowed_capabilities,
            ]
        );
        if let Some(value) = self.max_retries {
            config.retry.max_retries = value;
        }
        if let Some(value) = self.backoff_base_ms {
            config.retry.base_delay_ms = value;
        }
        if let Some(value) = self.backoff_multiplier {
            config.retry.multiplier = value;
        }
        if let Some(value) = self.backoff_max_ms {
            config.retry.max_delay_ms = value;
        }
        if let Some(value) = self.backoff_jitter {
            config.retry.jitter = value;
        }
    }

    /// Parse a JSON project document.
    pub fn from_json_str(input: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(input).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Read and parse a JSON project document.
    pub fn from_document(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        Self::from_json_str(&contents, &display)
    }

    /// Read `AGENT_POOL_*` variables from the process environment, loading a
    /// `.env` file first if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        Self::from_env_vars(std::env::vars())
    }

    /// Build a layer from `(name, value)` pairs. Unrelated names are ignored.
    pub fn from_env_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut layer = Self::default();
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "MAX_WORKERS" => layer.max_workers = Some(parse_env("max_workers", value)?),
                "TOKEN_BUDGET" => layer.token_budget = Some(parse_env("token_budget", value)?),
                "WINDOW_SECONDS" => {
                    layer.window_seconds = Some(parse_env("window_seconds", value)?);
                }
                "TASK_TIMEOUT_SECS" => {
                    layer.task_timeout_secs = Some(parse_env("task_timeout_secs", value)?);
                }
                "QUEUE_WAIT_TIMEOUT_SECS" => {
                    layer.queue_wait_timeout_secs =
                        Some(parse_env("queue_wait_timeout_secs", value)?);
                }
                "MAX_PAYLOAD_UNITS" => {
                    layer.max_payload_units = Some(parse_env("max_payload_units", value)?);
                }
                "LOOKAHEAD" => layer.lookahead = Some(parse_env("lookahead", value)?),
                "LOCAL_QUEUE_DEPTH" => {
                    layer.local_queue_depth = Some(parse_env("local_queue_depth", value)?);
                }
                "DEFAULT_ESTIMATED_TOKENS" => {
                    layer.default_estimated_tokens =
                        Some(parse_env("default_estimated_tokens", value)?);
                }
                "FAIL_FAST" => layer.fail_fast = Some(parse_env("fail_fast", value)?),
                "WORK_STEALING" => {
                    layer.work_stealing = Some(parse_env("work_stealing", value)?);
                }
                "ALLOWED_CAPABILITIES" => {
                    layer.allowed_capabilities = Some(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(ToString::to_string)
                            .collect(),
                    );
                }
                "MAX_RETRIES" => layer.max_retries = Some(parse_env("retry.max_retries", value)?),
                "BACKOFF_BASE_MS" => {
                    layer.backoff_base_ms = Some(parse_env("retry.base_delay_ms", value)?);
                }
                "BACKOFF_MULTIPLIER" => {
                    layer.backoff_multiplier = Some(parse_env("retry.multiplier", value)?);
                }
                "BACKOFF_MAX_MS" => {
                    layer.backoff_max_ms = Some(parse_env("retry.max_delay_ms", value)?);
                }
                "BACKOFF_JITTER" => {
                    layer.backoff_jitter = Some(parse_env("retry.jitter", value)?);
                }
                other => tracing::warn!(variable = other, "ignoring unknown pool override"),
            }
        }
        Ok(layer)
    }
}

fn parse_env<T>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(field, format!("cannot parse `{value}`: {e}")))
}
