//! Worker loop: claims admitted tasks, runs them through the executor with
//! per-attempt deadlines and retry, and settles their budget.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::balancer::steal_victim;
use super::{AdmittedTask, Counters, PoolInner};
use crate::config::MAX_DURATION_SECS;
use crate::core::audit::AuditAction;
use crate::core::error::ExecutorError;
use crate::core::executor::ExecutionRequest;
use crate::core::task::{AgentResult, FailureKind, Task, TaskState, WorkerId};

/// How one attempt went wrong.
enum AttemptFailure {
    Executor(ExecutorError),
    Deadline(Duration),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executor(err) => write!(f, "{err}"),
            Self::Deadline(timeout) => write!(f, "attempt exceeded {}ms deadline", timeout.as_millis()),
        }
    }
}

/// Final outcome of a run, before it becomes an [`AgentResult`].
enum Outcome {
    Completed(String),
    Failed(FailureKind, String),
    TimedOut(String),
    Cancelled(String),
}

impl Outcome {
    const fn state(&self) -> TaskState {
        match self {
            Self::Completed(_) => TaskState::Completed,
            Self::Failed(..) => TaskState::Failed,
            Self::TimedOut(_) => TaskState::TimedOut,
            Self::Cancelled(_) => TaskState::Cancelled,
        }
    }

    const fn audit_action(&self) -> AuditAction {
        match self {
            Self::Completed(_) => AuditAction::Completed,
            Self::Failed(..) => AuditAction::Failed,
            Self::TimedOut(_) => AuditAction::TimedOut,
            Self::Cancelled(_) => AuditAction::Cancelled,
        }
    }
}

impl PoolInner {
    /// Runs until shutdown, parking on the worker's own wake signal when there
    /// is nothing to claim or steal.
    pub(crate) async fn run_worker(self: Arc<Self>, worker: WorkerId) {
        debug!(worker_id = %worker, "worker started");
        loop {
            let notified = self.worker_wakes[worker.0].notified();
            if let Some(admitted) = self.claim_next(worker) {
                self.run_task(worker, admitted).await;
                continue;
            }
            if self.is_shutdown() {
                break;
            }
            // Idle: give admission a chance to hand us something.
            self.admission_wake.notify_one();
            notified.await;
        }
        debug!(worker_id = %worker, "worker stopped");
    }

    /// Take the next task from the local queue, or (when stealing is enabled)
    /// steal one from the tail of the busiest worker.
    fn claim_next(&self, worker: WorkerId) -> Option<AdmittedTask> {
        let (admitted, victim) = {
            let mut state = self.state.lock();
            let workers = &mut state.workers;
            let (admitted, victim) = match workers[worker.0].local.pop_front() {
                Some(admitted) => (admitted, None),
                None if self.config.work_stealing => {
                    let victim = steal_victim(workers, worker.0)?;
                    let admitted = workers[victim].local.pop_back()?;
                    (admitted, Some(workers[victim].id))
                }
                None => return None,
            };
            workers[worker.0].current = Some(admitted.task.id);
            admitted.task.shared.transition(TaskState::Running);
            (admitted, victim)
        };

        let task_id = admitted.task.id;
        if let Some(victim) = victim {
            Counters::bump(&self.counters.steals);
            debug!(task_id = %task_id, worker_id = %worker, victim = %victim, "task stolen");
            self.audit(
                Some(task_id),
                Some(worker),
                AuditAction::Stolen,
                Some(format!("from {victim}")),
            );
        }
        self.audit(Some(task_id), Some(worker), AuditAction::Started, None);
        Some(admitted)
    }

    async fn run_task(&self, worker: WorkerId, admitted: AdmittedTask) {
        let AdmittedTask { task, reservation } = admitted;
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut tokens_used = 0u64;
        info!(task_id = %task.id, worker_id = %worker, priority = %task.priority, "task started");

        let outcome = loop {
            if attempts > 0 && task.shared.cancel.is_cancelled() {
                break Outcome::Cancelled("cancelled by caller during backoff".to_string());
            }
            attempts += 1;
            let now = Instant::now();
            let deadline = now
                .checked_add(task.timeout)
                .unwrap_or_else(|| now + Duration::from_secs(MAX_DURATION_SECS));
            let request = ExecutionRequest {
                task_id: task.id,
                worker_id: worker,
                attempt: attempts,
                capability: task.capability.clone(),
                payload: task.payload.clone(),
                deadline,
                cancel: task.shared.cancel.clone(),
            };

            let attempt = AssertUnwindSafe(self.executor.execute(request)).catch_unwind();
            let failure = match tokio::time::timeout_at(deadline, attempt).await {
                Ok(Ok(Ok(report))) => {
                    tokens_used = tokens_used.saturating_add(report.units_consumed);
                    break Outcome::Completed(report.output);
                }
                Ok(Ok(Err(err))) => {
                    tokens_used = tokens_used.saturating_add(err.units_consumed());
                    AttemptFailure::Executor(err)
                }
                Ok(Err(panic)) => {
                    let message = panic_message(panic.as_ref());
                    warn!(task_id = %task.id, worker_id = %worker, panic = %message, "executor panicked");
                    AttemptFailure::Executor(ExecutorError::permanent(format!(
                        "executor panicked: {message}"
                    )))
                }
                Err(_) => AttemptFailure::Deadline(task.timeout),
            };

            if task.shared.cancel.is_cancelled() {
                break Outcome::Cancelled(format!("cancelled by caller ({failure})"));
            }
            let retryable = match &failure {
                AttemptFailure::Executor(err) => err.is_transient(),
                AttemptFailure::Deadline(_) => true,
            };
            if !retryable {
                break Outcome::Failed(FailureKind::Executor, failure.to_string());
            }
            if !self.config.retry.should_retry(attempts) {
                break match failure {
                    AttemptFailure::Deadline(_) => Outcome::TimedOut(failure.to_string()),
                    AttemptFailure::Executor(_) => Outcome::Failed(
                        FailureKind::RetriesExhausted,
                        format!("retries exhausted after {attempts} attempts: {failure}"),
                    ),
                };
            }

            let delay = self.config.retry.delay_for(attempts);
            Counters::bump(&self.counters.retries);
            warn!(
                task_id = %task.id,
                worker_id = %worker,
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "attempt failed, retrying"
            );
            self.audit(
                Some(task.id),
                Some(worker),
                AuditAction::Retried,
                Some(failure.to_string()),
            );
            tokio::time::sleep(delay).await;
        };

        self.tracker.settle(reservation, tokens_used);
        self.state.lock().workers[worker.0].current = None;
        self.finish_run(
            worker,
            &task,
            outcome,
            tokens_used,
            attempts,
            started.elapsed(),
        );
        self.admission_wake.notify_one();
    }

    fn finish_run(
        &self,
        worker: WorkerId,
        task: &Task,
        outcome: Outcome,
        tokens_used: u64,
        attempts: u32,
        duration: Duration,
    ) {
        let state = outcome.state();
        let action = outcome.audit_action();
        let (output, error, failure) = match outcome {
            Outcome::Completed(output) => (Some(output), None, None),
            Outcome::Failed(kind, message) => (None, Some(message), Some(kind)),
            Outcome::TimedOut(message) => (None, Some(message), Some(FailureKind::TimedOut)),
            Outcome::Cancelled(message) => (None, Some(message), Some(FailureKind::Cancelled)),
        };

        if state == TaskState::Completed {
            info!(task_id = %task.id, worker_id = %worker, tokens_used, attempts, "task completed");
        } else {
            warn!(
                task_id = %task.id,
                worker_id = %worker,
                state = ?state,
                tokens_used,
                attempts,
                error = error.as_deref().unwrap_or_default(),
                "task did not complete"
            );
        }
        self.counters.record_outcome(state);
        self.audit(Some(task.id), Some(worker), action, error.clone());

        task.shared.finish(AgentResult {
            task_id: task.id,
            capability: task.capability.clone(),
            priority: task.priority,
            state,
            success: state == TaskState::Completed,
            output,
            error,
            failure,
            tokens_used,
            duration,
            worker_id: Some(worker),
            attempts,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
