//! Token-aware agent pool.
//!
//! The pool owns one admission loop and a fixed set of worker loops, all
//! spawned through a [`Spawn`] implementation. Submissions land in a global
//! priority queue. The admission loop reserves estimated tokens against the
//! sliding-window [`TokenTracker`] and hands admitted tasks to the least-loaded
//! worker's local queue; idle workers steal from busy ones. Completion settles
//! the reservation with the actual usage and wakes admission again.
//!
//! Scheduler state (global queue plus worker table) sits behind one mutex.
//! The tracker has its own lock and is only ever taken after the state lock.
//! No lock is held across an await point.

mod admission;
mod balancer;
mod worker;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::builders::AgentPoolBuilder;
use crate::config::{PoolConfig, MAX_DURATION_SECS};
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::error::{SchedulerError, ValidationError};
use crate::core::executor::Executor;
use crate::core::handle::{TaskHandle, TaskShared};
use crate::core::queue::PriorityQueue;
use crate::core::task::{AgentResult, FailureKind, Priority, Task, TaskId, TaskSpec, TaskState, WorkerId};
use crate::core::token_tracker::{ReservationId, TokenTracker};

use balancer::WorkerSlot;

/// Longest capability tag accepted.
pub const MAX_CAPABILITY_LEN: usize = 64;

/// Spawner abstraction to decouple the pool from a specific runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Pool identifier.
    pub pool_id: Uuid,
    /// Number of worker loops.
    pub max_workers: usize,
    /// Workers currently running a task.
    pub active_workers: usize,
    /// Workers with nothing running.
    pub idle_workers: usize,
    /// Tasks waiting in the global queue.
    pub queue_depth: usize,
    /// Admitted tasks waiting in worker-local queues.
    pub prefetched: usize,
    /// Total token budget per window.
    pub token_budget: u64,
    /// Budget left after recorded usage and open reservations.
    pub remaining_budget: u64,
    /// Tokens held by open reservations.
    pub reserved_tokens: u64,
    /// Recorded usage in the current window, by capability.
    pub usage_by_source: BTreeMap<String, u64>,
    /// Lifetime counters.
    pub counters: PoolCounters,
    /// Whether the pool still accepts submissions.
    pub accepting: bool,
}

/// Lifetime task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolCounters {
    /// Tasks accepted into the queue.
    pub submitted: u64,
    /// Submissions refused by validation.
    pub rejected: u64,
    /// Tasks finished successfully.
    pub completed: u64,
    /// Tasks finished with an error.
    pub failed: u64,
    /// Tasks whose final attempt hit its deadline.
    pub timed_out: u64,
    /// Tasks cancelled, including at shutdown.
    pub cancelled: u64,
    /// Retry attempts scheduled.
    pub retries: u64,
    /// Tasks taken from another worker's local queue.
    pub steals: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    retries: AtomicU64,
    steals: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, state: TaskState) {
        match state {
            TaskState::Completed => Self::bump(&self.completed),
            TaskState::Failed => Self::bump(&self.failed),
            TaskState::TimedOut => Self::bump(&self.timed_out),
            TaskState::Cancelled => Self::bump(&self.cancelled),
            TaskState::Pending | TaskState::Admitted | TaskState::Running => {}
        }
    }

    fn snapshot(&self) -> PoolCounters {
        PoolCounters {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
        }
    }
}

/// A task whose estimate is reserved in the tracker.
pub(crate) struct AdmittedTask {
    pub(crate) task: Task,
    pub(crate) reservation: ReservationId,
}

pub(crate) struct SchedulerState {
    pub(crate) queue: PriorityQueue,
    pub(crate) workers: Vec<WorkerSlot<AdmittedTask>>,
}

impl SchedulerState {
    fn take_prefetched(&mut self, id: TaskId) -> Option<AdmittedTask> {
        self.workers.iter_mut().find_map(|worker| {
            let position = worker.local.iter().position(|a| a.task.id == id)?;
            worker.local.remove(position)
        })
    }
}

pub(crate) struct PoolInner {
    pub(crate) id: Uuid,
    pub(crate) config: PoolConfig,
    pub(crate) tracker: Arc<TokenTracker>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) state: Mutex<SchedulerState>,
    pub(crate) admission_wake: Notify,
    pub(crate) worker_wakes: Vec<Notify>,
    counters: Counters,
    audit: Option<Mutex<Box<dyn AuditSink>>>,
    next_id: AtomicU64,
    shutdown: AtomicBool,
}

impl PoolInner {
    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn audit(
        &self,
        task_id: Option<TaskId>,
        worker_id: Option<WorkerId>,
        action: AuditAction,
        detail: Option<String>,
    ) {
        if let Some(sink) = &self.audit {
            sink.lock()
                .record(build_audit_event(task_id, worker_id, action, detail));
        }
    }

    /// Resolve a task that never reached a worker.
    pub(crate) fn finish_unstarted(&self, task: &Task, failure: FailureKind, error: String) {
        let state = match failure {
            FailureKind::Cancelled | FailureKind::Shutdown => TaskState::Cancelled,
            _ => TaskState::Failed,
        };
        let action = if state == TaskState::Cancelled {
            AuditAction::Cancelled
        } else {
            AuditAction::Failed
        };
        self.counters.record_outcome(state);
        self.audit(Some(task.id), None, action, Some(error.clone()));
        task.shared
            .finish(AgentResult::not_started(task, state, failure, error));
    }

    /// Pull a not-yet-started task out of the scheduler and resolve it.
    fn withdraw(&self, shared: &TaskShared, failure: FailureKind, reason: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            match shared.state() {
                TaskState::Pending => state
                    .queue
                    .remove(shared.id, shared.priority)
                    .map(|task| (task, None)),
                TaskState::Admitted => state
                    .take_prefetched(shared.id)
                    .map(|admitted| (admitted.task, Some(admitted.reservation))),
                _ => None,
            }
        };
        let Some((task, reservation)) = removed else {
            return false;
        };
        if let Some(reservation) = reservation {
            self.tracker.release(reservation);
        }
        info!(task_id = %task.id, priority = %task.priority, "{reason}");
        self.finish_unstarted(&task, failure, reason.to_string());
        self.admission_wake.notify_one();
        true
    }
}

/// Token-budgeted pool of agent workers.
pub struct AgentPool {
    inner: Arc<PoolInner>,
}

impl AgentPool {
    /// Start a pool on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if `config` is invalid or no runtime is running.
    pub fn new<E: Executor>(config: PoolConfig, executor: E) -> Result<Self, SchedulerError> {
        AgentPoolBuilder::new(config, executor).build()
    }

    pub(crate) fn launch<S: Spawn>(
        config: PoolConfig,
        tracker: Arc<TokenTracker>,
        executor: Arc<dyn Executor>,
        audit: Option<Box<dyn AuditSink>>,
        spawner: &S,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let worker_count = config.effective_workers();
        let inner = Arc::new(PoolInner {
            id: Uuid::new_v4(),
            state: Mutex::new(SchedulerState {
                queue: PriorityQueue::new(),
                workers: (0..worker_count).map(|i| WorkerSlot::new(WorkerId(i))).collect(),
            }),
            worker_wakes: (0..worker_count).map(|_| Notify::new()).collect(),
            admission_wake: Notify::new(),
            counters: Counters::default(),
            audit: audit.map(Mutex::new),
            next_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            config,
            tracker,
            executor,
        });

        spawner.spawn(Arc::clone(&inner).run_admission());
        for index in 0..worker_count {
            spawner.spawn(Arc::clone(&inner).run_worker(WorkerId(index)));
        }

        info!(
            pool_id = %inner.id,
            workers = worker_count,
            token_budget = inner.tracker.budget(),
            window_secs = inner.tracker.window().as_secs(),
            "agent pool started"
        );
        Ok(Self { inner })
    }

    /// Unique identifier of this pool.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Shared token tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<TokenTracker> {
        &self.inner.tracker
    }

    /// Validate and enqueue a task.
    ///
    /// Never blocks on budget: the task waits in the queue until the admission
    /// loop can reserve its estimate.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Validation`] if the capability, payload or estimate is
    /// unacceptable, [`SchedulerError::PoolShutdown`] after [`AgentPool::shutdown`].
    pub fn submit_task(&self, spec: TaskSpec) -> Result<TaskHandle, SchedulerError> {
        let inner = &self.inner;
        let estimate = spec
            .estimated_tokens
            .unwrap_or(inner.config.default_estimated_tokens);
        if let Err(err) = self.validate(&spec, estimate) {
            Counters::bump(&inner.counters.rejected);
            warn!(capability = %spec.capability, error = %err, "submission rejected");
            inner.audit(None, None, AuditAction::Rejected, Some(err.to_string()));
            return Err(err.into());
        }

        let id = TaskId(inner.next_id.fetch_add(1, Ordering::Relaxed));
        let shared = Arc::new(TaskShared::new(id, spec.priority));
        let task = Task {
            id,
            capability: spec.capability,
            payload: spec.payload,
            priority: spec.priority,
            estimated_tokens: estimate,
            timeout: spec.timeout.unwrap_or_else(|| inner.config.task_timeout()),
            enqueued_at: Instant::now(),
            shared: Arc::clone(&shared),
        };
        let detail = format!("{} {} est={}", task.priority, task.capability, estimate);
        {
            let mut state = inner.state.lock();
            if inner.is_shutdown() {
                return Err(SchedulerError::PoolShutdown);
            }
            state.queue.push(task);
        }

        Counters::bump(&inner.counters.submitted);
        debug!(task_id = %id, estimated_tokens = estimate, "task enqueued");
        inner.audit(Some(id), None, AuditAction::Submitted, Some(detail));
        inner.admission_wake.notify_one();
        Ok(TaskHandle::new(inner.id, shared))
    }

    fn validate(&self, spec: &TaskSpec, estimate: u64) -> Result<(), ValidationError> {
        let config = &self.inner.config;
        validate_capability(&spec.capability, &config.allowed_capabilities)?;
        let size = spec.payload.chars().count();
        if size > config.max_payload_units {
            return Err(ValidationError::PayloadTooLarge {
                size,
                max: config.max_payload_units,
            });
        }
        let budget = self.inner.tracker.budget();
        if estimate > budget {
            return Err(ValidationError::EstimateExceedsBudget { estimate, budget });
        }
        if let Some(timeout) = spec.timeout {
            let max = Duration::from_secs(MAX_DURATION_SECS);
            if timeout.is_zero() || timeout > max {
                return Err(ValidationError::InvalidTimeout {
                    timeout_ms: timeout.as_millis(),
                    max_ms: max.as_millis(),
                });
            }
        }
        Ok(())
    }

    /// Cancel a task.
    ///
    /// Pending and admitted tasks are removed and resolve as cancelled at once.
    /// A running task gets its cancel signal set and resolves when the executor
    /// returns. Returns `false` if the task had already finished.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ForeignHandle`] if the handle came from another pool.
    pub fn cancel_task(&self, handle: &TaskHandle) -> Result<bool, SchedulerError> {
        self.check_owner(handle)?;
        let shared = handle.shared();
        if self
            .inner
            .withdraw(shared, FailureKind::Cancelled, "cancelled by caller")
        {
            return Ok(true);
        }
        if shared.state() == TaskState::Running {
            shared.cancel.cancel();
            info!(task_id = %shared.id, "cancellation requested for running task");
            return Ok(true);
        }
        Ok(false)
    }

    /// Wait for every handle and return the results in input order.
    ///
    /// With `fail_fast` set, a failure in the highest priority class present in
    /// the batch cancels the batch's lower-priority tasks that have not started
    /// and returns [`SchedulerError::BatchAborted`].
    ///
    /// # Errors
    ///
    /// [`SchedulerError::ForeignHandle`] for a handle from another pool, or
    /// [`SchedulerError::BatchAborted`] as described above.
    pub async fn await_all(&self, handles: &[TaskHandle]) -> Result<Vec<AgentResult>, SchedulerError> {
        for handle in handles {
            self.check_owner(handle)?;
        }
        let top = handles.iter().map(TaskHandle::priority).max();
        let mut results: Vec<Option<AgentResult>> = vec![None; handles.len()];
        let mut pending: FuturesUnordered<_> = handles
            .iter()
            .enumerate()
            .map(|(index, handle)| async move { (index, handle.wait().await) })
            .collect();

        while let Some((index, result)) = pending.next().await {
            if self.inner.config.fail_fast && !result.success && Some(result.priority) == top {
                let withdrawn = self.abort_batch(handles, result.priority);
                warn!(
                    task_id = %result.task_id,
                    priority = %result.priority,
                    withdrawn,
                    "fail-fast: aborting batch"
                );
                return Err(SchedulerError::BatchAborted {
                    task_id: result.task_id,
                    priority: result.priority,
                    reason: result.error.unwrap_or_else(|| format!("{:?}", result.state)),
                });
            }
            results[index] = Some(result);
        }
        Ok(results.into_iter().flatten().collect())
    }

    fn abort_batch(&self, handles: &[TaskHandle], failed: Priority) -> usize {
        handles
            .iter()
            .filter(|handle| handle.priority() < failed)
            .filter(|handle| {
                self.inner.withdraw(
                    handle.shared(),
                    FailureKind::Cancelled,
                    "cancelled by fail-fast batch",
                )
            })
            .count()
    }

    /// Snapshot of workers, queue, budget and counters.
    #[must_use]
    pub fn get_pool_status(&self) -> PoolStatus {
        let inner = &self.inner;
        let (active_workers, queue_depth, prefetched) = {
            let state = inner.state.lock();
            (
                state.workers.iter().filter(|w| w.is_busy()).count(),
                state.queue.len(),
                state.workers.iter().map(|w| w.local.len()).sum::<usize>(),
            )
        };
        let max_workers = inner.worker_wakes.len();
        PoolStatus {
            pool_id: inner.id,
            max_workers,
            active_workers,
            idle_workers: max_workers - active_workers,
            queue_depth,
            prefetched,
            token_budget: inner.tracker.budget(),
            remaining_budget: inner.tracker.remaining_budget(),
            reserved_tokens: inner.tracker.reserved(),
            usage_by_source: inner.tracker.usage_by_source(),
            counters: inner.counters.snapshot(),
            accepting: !inner.is_shutdown(),
        }
    }

    /// Stop accepting work and cancel everything that has not started.
    ///
    /// Running tasks finish normally; worker loops exit once idle. Calling this
    /// more than once is a no-op.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        let drained: Vec<(Task, Option<ReservationId>)> = {
            let mut state = inner.state.lock();
            if inner.shutdown.swap(true, Ordering::AcqRel) {
                return;
            }
            let mut drained: Vec<_> = state.queue.drain().into_iter().map(|t| (t, None)).collect();
            for worker in &mut state.workers {
                drained.extend(worker.local.drain(..).map(|a| (a.task, Some(a.reservation))));
            }
            drained
        };

        info!(pool_id = %inner.id, cancelled = drained.len(), "shutting down agent pool");
        for (task, reservation) in drained {
            if let Some(reservation) = reservation {
                inner.tracker.release(reservation);
            }
            inner.finish_unstarted(&task, FailureKind::Shutdown, "pool shut down".to_string());
        }
        inner.admission_wake.notify_one();
        for wake in &inner.worker_wakes {
            wake.notify_one();
        }
    }

    fn check_owner(&self, handle: &TaskHandle) -> Result<(), SchedulerError> {
        if handle.pool_id() == self.inner.id {
            Ok(())
        } else {
            Err(SchedulerError::ForeignHandle(handle.id()))
        }
    }
}

impl Drop for AgentPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPool")
            .field("id", &self.inner.id)
            .field("workers", &self.inner.worker_wakes.len())
            .finish_non_exhaustive()
    }
}

/// Check a capability tag for shape and membership in the allow-list.
///
/// # Errors
///
/// Returns the first rule the tag breaks.
pub fn validate_capability(capability: &str, allowed: &[String]) -> Result<(), ValidationError> {
    if capability.is_empty() {
        return Err(ValidationError::EmptyCapability);
    }
    let well_formed = capability.len() <= MAX_CAPABILITY_LEN
        && !capability.contains("..")
        && capability
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if !well_formed {
        return Err(ValidationError::InvalidCapability(capability.to_string()));
    }
    if !allowed.iter().any(|a| a == capability) {
        return Err(ValidationError::UnknownCapability(capability.to_string()));
    }
    Ok(())
}
