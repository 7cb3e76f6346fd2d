//! Caller-facing task handles and their single-assignment result slots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::core::task::{AgentResult, Priority, TaskId, TaskState};

/// Cooperative cancellation flag shared between the scheduler and the executor.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    requested: Arc<AtomicBool>,
}

impl CancelSignal {
    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }
}

/// State shared by the scheduler's copy of a task and every handle to it.
#[derive(Debug)]
pub(crate) struct TaskShared {
    pub(crate) id: TaskId,
    pub(crate) priority: Priority,
    state: Mutex<TaskState>,
    pub(crate) cancel: CancelSignal,
    result: OnceLock<AgentResult>,
    ready: Notify,
}

impl TaskShared {
    pub(crate) fn new(id: TaskId, priority: Priority) -> Self {
        Self {
            id,
            priority,
            state: Mutex::new(TaskState::Pending),
            cancel: CancelSignal::default(),
            result: OnceLock::new(),
            ready: Notify::new(),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        *self.state.lock()
    }

    /// Move to a non-terminal state. Refused once the task is terminal.
    pub(crate) fn transition(&self, next: TaskState) -> bool {
        let mut state = self.state.lock();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    /// Publish the final result. Only the first call wins.
    pub(crate) fn finish(&self, result: AgentResult) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return false;
            }
            *state = result.state;
        }
        let stored = self.result.set(result).is_ok();
        self.ready.notify_waiters();
        stored
    }

    pub(crate) fn result(&self) -> Option<&AgentResult> {
        self.result.get()
    }

    pub(crate) async fn wait(&self) -> AgentResult {
        loop {
            let notified = self.ready.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }
            notified.await;
        }
    }
}

/// Opaque reference to a submitted task's eventual result.
///
/// Handles are cheap to clone. The result is immutable once published; dropping
/// every handle after reading it releases the task's memory.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pool_id: Uuid,
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    pub(crate) const fn new(pool_id: Uuid, shared: Arc<TaskShared>) -> Self {
        Self { pool_id, shared }
    }

    /// Task identifier.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    /// Scheduling class of the task.
    #[must_use]
    pub fn priority(&self) -> Priority {
        self.shared.priority
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.shared.state()
    }

    /// Whether cancellation was requested for this task.
    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// The result, if the task has finished.
    #[must_use]
    pub fn try_result(&self) -> Option<AgentResult> {
        self.shared.result().cloned()
    }

    /// Wait until the task reaches a terminal state.
    pub async fn wait(&self) -> AgentResult {
        self.shared.wait().await
    }

    pub(crate) const fn pool_id(&self) -> Uuid {
        self.pool_id
    }

    pub(crate) const fn shared(&self) -> &Arc<TaskShared> {
        &self.shared
    }
}
