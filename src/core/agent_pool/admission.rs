//! Admission loop: turns queued tasks into budget reservations and dispatches
//! them to workers.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::balancer::dispatch_target;
use super::{AdmittedTask, PoolInner, SchedulerState};
use crate::core::audit::AuditAction;
use crate::core::task::{FailureKind, Priority, TaskId, TaskState, WorkerId};

struct Dispatched {
    task_id: TaskId,
    priority: Priority,
    estimate: u64,
    worker: WorkerId,
}

impl PoolInner {
    /// Runs until shutdown. Woken on submission, completion, cancellation,
    /// idle workers, and by a timer for the next window expiry or queue-wait
    /// deadline.
    pub(crate) async fn run_admission(self: Arc<Self>) {
        debug!(pool_id = %self.id, "admission loop started");
        loop {
            let notified = self.admission_wake.notified();
            if self.is_shutdown() {
                break;
            }
            self.expire_stale();
            self.admit_ready();

            match self.next_timer_wake() {
                Some(deadline) => {
                    tokio::select! {
                        () = notified => {}
                        () = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
        debug!(pool_id = %self.id, "admission loop stopped");
    }

    /// Fail tasks that waited longer than the queue-wait timeout.
    fn expire_stale(&self) {
        let max_wait = self.config.queue_wait_timeout();
        let stale = self.state.lock().queue.drain_stale(Instant::now(), max_wait);
        for task in stale {
            warn!(
                task_id = %task.id,
                priority = %task.priority,
                estimated_tokens = task.estimated_tokens,
                "task waited {}s without budget",
                max_wait.as_secs()
            );
            self.finish_unstarted(
                &task,
                FailureKind::BudgetExhausted,
                format!(
                    "token budget exhausted: no admission within {}s",
                    max_wait.as_secs()
                ),
            );
        }
    }

    /// Admit as many queued tasks as budget and worker capacity allow.
    pub(crate) fn admit_ready(&self) -> usize {
        let mut dispatched = Vec::new();
        {
            let mut state = self.state.lock();
            let SchedulerState { queue, workers } = &mut *state;
            while let Some(target) = dispatch_target(workers, self.config.local_queue_depth) {
                let Some((task, reservation)) = queue.pop_admissible(self.config.lookahead, |t| {
                    self.tracker.try_reserve(&t.capability, t.estimated_tokens)
                }) else {
                    break;
                };
                task.shared.transition(TaskState::Admitted);
                let worker = &mut workers[target];
                dispatched.push(Dispatched {
                    task_id: task.id,
                    priority: task.priority,
                    estimate: task.estimated_tokens,
                    worker: worker.id,
                });
                worker.local.push_back(AdmittedTask { task, reservation });
                self.worker_wakes[target].notify_one();
            }
        }

        for entry in &dispatched {
            debug!(
                task_id = %entry.task_id,
                priority = %entry.priority,
                estimated_tokens = entry.estimate,
                worker_id = %entry.worker,
                "task admitted"
            );
            self.audit(
                Some(entry.task_id),
                Some(entry.worker),
                AuditAction::Admitted,
                Some(format!("reserved {}", entry.estimate)),
            );
        }
        dispatched.len()
    }

    /// Earliest instant at which waiting longer could change an admission
    /// decision. `None` when nothing is queued.
    fn next_timer_wake(&self) -> Option<Instant> {
        let oldest = {
            let state = self.state.lock();
            state.queue.oldest_enqueued_at()?
        };
        let stale_at = oldest.checked_add(self.config.queue_wait_timeout());
        match (self.tracker.next_expiry(), stale_at) {
            (Some(expiry), Some(stale_at)) => Some(expiry.min(stale_at)),
            (expiry, stale_at) => expiry.or(stale_at),
        }
    }
}
