//! API-facing request/response models.
//!
//! Thin JSON-friendly layer over [`AgentPool`] for callers that speak in
//! serialized requests rather than Rust types.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{
    AgentPool, AgentResult, AppResult, Priority, SchedulerError, TaskHandle, TaskId, TaskSpec,
    TaskState,
};

/// Task submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSubmission {
    /// Capability tag.
    pub capability: String,
    /// Work payload.
    pub payload: String,
    /// Priority class.
    pub priority: Priority,
    /// Estimated token cost; the pool default applies when absent.
    #[serde(default)]
    pub estimated_tokens: Option<u64>,
    /// Per-attempt timeout in seconds; the pool default applies when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl From<TaskSubmission> for TaskSpec {
    fn from(req: TaskSubmission) -> Self {
        Self {
            capability: req.capability,
            payload: req.payload,
            priority: req.priority,
            estimated_tokens: req.estimated_tokens,
            timeout: req.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Task status response.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusResponse {
    /// Task identifier.
    pub task_id: TaskId,
    /// Current state.
    pub state: TaskState,
    /// Final result once the task is terminal.
    pub result: Option<AgentResult>,
}

impl From<&TaskHandle> for TaskStatusResponse {
    fn from(handle: &TaskHandle) -> Self {
        Self {
            task_id: handle.id(),
            state: handle.state(),
            result: handle.try_result(),
        }
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
    /// Whether submissions are accepted.
    pub accepting: bool,
    /// Tokens available for admission right now.
    pub remaining_budget: u64,
}

/// Submit a task to a pool.
///
/// # Errors
///
/// Whatever [`AgentPool::submit_task`] rejects the request with.
pub fn submit_task(pool: &AgentPool, req: TaskSubmission) -> Result<TaskHandle, SchedulerError> {
    pool.submit_task(req.into())
}

/// Parse a JSON [`TaskSubmission`] and submit it.
///
/// # Errors
///
/// Fails on malformed JSON or a rejected submission.
pub fn submit_json(pool: &AgentPool, body: &str) -> AppResult<TaskHandle> {
    let req: TaskSubmission =
        serde_json::from_str(body).context("failed to parse task submission")?;
    let capability = req.capability.clone();
    submit_task(pool, req).with_context(|| format!("failed to submit `{capability}` task"))
}

/// Status of one task as a response model.
#[must_use]
pub fn task_status(handle: &TaskHandle) -> TaskStatusResponse {
    TaskStatusResponse::from(handle)
}

/// Serialized pool status snapshot.
///
/// # Errors
///
/// Fails only if serialization fails.
pub fn status_json(pool: &AgentPool) -> AppResult<String> {
    serde_json::to_string(&pool.get_pool_status()).context("failed to serialize pool status")
}

/// Return a health payload.
#[must_use]
pub fn health(pool: &AgentPool) -> Health {
    let status = pool.get_pool_status();
    Health {
        ok: status.accepting,
        accepting: status.accepting,
        remaining_budget: status.remaining_budget,
    }
}
