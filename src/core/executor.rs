//! Executor contract and an in-memory test double.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::core::error::ExecutorError;
use crate::core::handle::CancelSignal;
use crate::core::task::{TaskId, WorkerId};

/// Everything the executor needs for one attempt.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Task being executed.
    pub task_id: TaskId,
    /// Worker running the attempt.
    pub worker_id: WorkerId,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Capability tag.
    pub capability: String,
    /// Work payload.
    pub payload: String,
    /// Instant after which the scheduler abandons the attempt.
    pub deadline: Instant,
    /// Set when the caller asks for cancellation; checking it is cooperative.
    pub cancel: CancelSignal,
}

/// Successful executor output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Produced output.
    pub output: String,
    /// Tokens consumed by the attempt.
    pub units_consumed: u64,
}

/// Abstraction for the component that performs a task's work.
///
/// The scheduler calls `execute` once per attempt, never while holding a lock,
/// and measures duration itself.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_agent_pool::core::{ExecutionReport, ExecutionRequest, Executor, ExecutorError};
///
/// struct EchoExecutor;
///
/// #[async_trait]
/// impl Executor for EchoExecutor {
///     async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionReport, ExecutorError> {
///         Ok(ExecutionReport { output: request.payload, units_consumed: 10 })
///     }
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Run one attempt of a task.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionReport, ExecutorError>;
}

/// Scripted response for [`InMemoryExecutor`].
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Succeed with this output.
    Succeed(String),
    /// Fail transiently.
    Transient(String),
    /// Fail permanently.
    Permanent(String),
    /// Never return; the scheduler's deadline fires instead.
    Hang,
}

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    running: AtomicU64,
    peak: AtomicU64,
}

/// Decrements the running gauge even when the attempt future is dropped on timeout.
struct RunningGuard<'a>(&'a Counters);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory executor for tests and local development.
///
/// Responses are scripted per payload and consumed in order; unscripted calls
/// succeed with `"{capability}:{payload}"`. Tracks call count and peak concurrency.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutor {
    delay: Duration,
    units_per_call: u64,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    scripts: Arc<Mutex<HashMap<String, VecDeque<ScriptedResponse>>>>,
    counters: Arc<Counters>,
}

impl InMemoryExecutor {
    /// Executor that succeeds immediately and consumes no tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long on every call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report this many consumed tokens on every call.
    #[must_use]
    pub const fn with_units(mut self, units: u64) -> Self {
        self.units_per_call = units;
        self
    }

    /// Override the delay for one payload.
    #[must_use]
    pub fn with_payload_delay(self, payload: impl Into<String>, delay: Duration) -> Self {
        self.delays.lock().insert(payload.into(), delay);
        self
    }

    /// Queue responses for a payload.
    pub fn script<I>(&self, payload: impl Into<String>, responses: I)
    where
        I: IntoIterator<Item = ScriptedResponse>,
    {
        self.scripts
            .lock()
            .entry(payload.into())
            .or_default()
            .extend(responses);
    }

    /// Number of `execute` calls so far.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.counters.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous `execute` calls observed.
    #[must_use]
    pub fn peak_concurrency(&self) -> u64 {
        self.counters.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for InMemoryExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionReport, ExecutorError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(running, Ordering::SeqCst);
        let _guard = RunningGuard(&self.counters);

        let response = self
            .scripts
            .lock()
            .get_mut(&request.payload)
            .and_then(VecDeque::pop_front);
        let delay = self
            .delays
            .lock()
            .get(&request.payload)
            .copied()
            .unwrap_or(self.delay);

        if matches!(response, Some(ScriptedResponse::Hang)) {
            std::future::pending::<()>().await;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if request.cancel.is_cancelled() {
            return Err(ExecutorError::permanent("cancelled"));
        }

        match response {
            Some(ScriptedResponse::Transient(message)) => Err(ExecutorError::Transient {
                message,
                units_consumed: self.units_per_call,
            }),
            Some(ScriptedResponse::Permanent(message)) => Err(ExecutorError::Permanent {
                message,
                units_consumed: self.units_per_call,
            }),
            Some(ScriptedResponse::Succeed(output)) => Ok(ExecutionReport {
                output,
                units_consumed: self.units_per_call,
            }),
            Some(ScriptedResponse::Hang) | None => Ok(ExecutionReport {
                output: format!("{}:{}", request.capability, request.payload),
                units_consumed: self.units_per_call,
            }),
        }
    }
}
