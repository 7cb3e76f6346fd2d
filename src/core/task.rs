//! Task records, priorities and results.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::core::handle::TaskShared;

/// Identifier assigned at submission.
///
/// Ids come from a single per-pool counter, so they double as the submission
/// sequence number used for FIFO ordering within a priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Index of a worker in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Scheduling class. Variants are declared lowest first so the derived `Ord`
/// ranks `Security` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Nice-to-have work.
    Optional,
    /// Documentation work.
    Docs,
    /// Test work.
    Tests,
    /// Security work; always scheduled first.
    Security,
}

impl Priority {
    /// All classes, highest first.
    pub const ALL: [Self; 4] = [Self::Security, Self::Tests, Self::Docs, Self::Optional];
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Security => "SECURITY",
            Self::Tests => "TESTS",
            Self::Docs => "DOCS",
            Self::Optional => "OPTIONAL",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a task in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the global queue.
    Pending,
    /// Budget reserved and handed to a worker.
    Admitted,
    /// Executor invocation in flight.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Deadline expired on the final attempt.
    TimedOut,
    /// Cancelled before or during execution.
    Cancelled,
}

impl TaskState {
    /// Whether the state can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }
}

/// Why a task did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Permanent executor failure.
    Executor,
    /// Transient failures outlasted the retry policy.
    RetriesExhausted,
    /// The final attempt hit its deadline.
    TimedOut,
    /// Cancelled by the caller or by a fail-fast batch.
    Cancelled,
    /// Waited in the queue past the wait timeout.
    BudgetExhausted,
    /// The pool shut down before the task ran.
    Shutdown,
}

/// Caller-side description of a unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Capability tag selecting the kind of agent.
    pub capability: String,
    /// Work payload handed to the executor.
    pub payload: String,
    /// Scheduling class.
    pub priority: Priority,
    /// Estimated token cost; falls back to the pool default.
    pub estimated_tokens: Option<u64>,
    /// Per-attempt timeout; falls back to the pool default.
    pub timeout: Option<Duration>,
}

impl TaskSpec {
    /// Create a spec with pool defaults for estimate and timeout.
    pub fn new(capability: impl Into<String>, payload: impl Into<String>, priority: Priority) -> Self {
        Self {
            capability: capability.into(),
            payload: payload.into(),
            priority,
            estimated_tokens: None,
            timeout: None,
        }
    }

    /// Set the estimated token cost.
    #[must_use]
    pub const fn with_estimated_tokens(mut self, tokens: u64) -> Self {
        self.estimated_tokens = Some(tokens);
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A validated task owned by the scheduler.
#[derive(Debug)]
pub struct Task {
    /// Identifier and submission sequence number.
    pub id: TaskId,
    /// Capability tag.
    pub capability: String,
    /// Work payload.
    pub payload: String,
    /// Scheduling class.
    pub priority: Priority,
    /// Tokens reserved at admission.
    pub estimated_tokens: u64,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// When the task entered the global queue.
    pub enqueued_at: Instant,
    pub(crate) shared: Arc<TaskShared>,
}

/// Outcome of a task, delivered through its handle.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    /// Task the result belongs to.
    pub task_id: TaskId,
    /// Capability tag of the task.
    pub capability: String,
    /// Scheduling class of the task.
    pub priority: Priority,
    /// Terminal state.
    pub state: TaskState,
    /// Whether the executor produced output successfully.
    pub success: bool,
    /// Executor output on success.
    pub output: Option<String>,
    /// Failure description.
    pub error: Option<String>,
    /// Failure classification.
    pub failure: Option<FailureKind>,
    /// Tokens consumed across all attempts.
    pub tokens_used: u64,
    /// Wall time from first start to finish, including backoff.
    pub duration: Duration,
    /// Worker that ran the task, if it ever started.
    pub worker_id: Option<WorkerId>,
    /// Executor invocations made.
    pub attempts: u32,
}

impl AgentResult {
    /// Result for a task that never reached a worker.
    pub(crate) fn not_started(task: &Task, state: TaskState, failure: FailureKind, error: String) -> Self {
        Self {
            task_id: task.id,
            capability: task.capability.clone(),
            priority: task.priority,
            state,
            success: false,
            output: None,
            error: Some(error),
            failure: Some(failure),
            tokens_used: 0,
            duration: Duration::ZERO,
            worker_id: None,
            attempts: 0,
        }
    }
}
