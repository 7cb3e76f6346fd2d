//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::task::{Priority, TaskId};

/// Rejections raised synchronously by `submit_task`. The task is never enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Capability tag was empty.
    #[error("capability tag must not be empty")]
    EmptyCapability,
    /// Capability tag contains characters or sequences that are never allowed.
    #[error("capability tag `{0}` contains illegal characters")]
    InvalidCapability(String),
    /// Capability tag is well-formed but not on the allow-list.
    #[error("unknown capability `{0}`")]
    UnknownCapability(String),
    /// Payload exceeds the configured hard cap.
    #[error("payload of {size} units exceeds the cap of {max}")]
    PayloadTooLarge {
        /// Payload size in characters.
        size: usize,
        /// Configured cap.
        max: usize,
    },
    /// Estimated cost can never fit in the window budget.
    #[error("estimated cost {estimate} exceeds the token budget {budget}")]
    EstimateExceedsBudget {
        /// Estimated tokens for the task.
        estimate: u64,
        /// Total token budget of the window.
        budget: u64,
    },
    /// Per-task timeout is zero or longer than the pool accepts.
    #[error("task timeout of {timeout_ms}ms is outside (0, {max_ms}ms]")]
    InvalidTimeout {
        /// Requested timeout in milliseconds.
        timeout_ms: u128,
        /// Longest accepted timeout in milliseconds.
        max_ms: u128,
    },
}

/// Invalid pool parameters. Raised while resolving configuration and always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range or could not be parsed.
    #[error("invalid `{field}`: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Human readable reason.
        reason: String,
    },
    /// The project config document could not be read.
    #[error("failed to read config document {path}: {source}")]
    Io {
        /// Path of the document.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The project config document is not valid JSON for the override schema.
    #[error("failed to parse config document {path}: {source}")]
    Parse {
        /// Path of the document.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending field, if the error is field-specific.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { field, .. } => Some(field),
            Self::Io { .. } | Self::Parse { .. } => None,
        }
    }
}

/// Failures reported by an [`Executor`](crate::core::Executor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// Temporary failure; the scheduler may retry.
    #[error("transient executor failure: {message}")]
    Transient {
        /// Failure description.
        message: String,
        /// Tokens consumed before failing.
        units_consumed: u64,
    },
    /// Failure that will not go away on retry.
    #[error("executor failure: {message}")]
    Permanent {
        /// Failure description.
        message: String,
        /// Tokens consumed before failing.
        units_consumed: u64,
    },
    /// The executor does not know how to serve the capability.
    #[error("executor does not support capability `{0}`")]
    UnknownCapability(String),
}

impl ExecutorError {
    /// Transient failure with no token usage.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            units_consumed: 0,
        }
    }

    /// Permanent failure with no token usage.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            units_consumed: 0,
        }
    }

    /// Whether a retry may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Tokens consumed by the failed attempt.
    #[must_use]
    pub const fn units_consumed(&self) -> u64 {
        match self {
            Self::Transient { units_consumed, .. } | Self::Permanent { units_consumed, .. } => {
                *units_consumed
            }
            Self::UnknownCapability(_) => 0,
        }
    }
}

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Submission rejected before enqueueing.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Pool parameters are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The handle was issued by a different pool.
    #[error("task {0} belongs to a different pool")]
    ForeignHandle(TaskId),
    /// The pool no longer accepts work.
    #[error("pool has been shut down")]
    PoolShutdown,
    /// No tokio runtime is available to launch the pool on.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
    /// Fail-fast mode aborted a batch after a top-priority failure.
    #[error("batch aborted: {priority} task {task_id} failed: {reason}")]
    BatchAborted {
        /// Failed task.
        task_id: TaskId,
        /// Its priority class.
        priority: Priority,
        /// Failure reason from its result.
        reason: String,
    },
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
