//! Global pending-task queue ordered by priority and submission sequence.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::task::{Priority, Task, TaskId};

/// Ordering key: higher priority first, then FIFO by task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueKey {
    priority: Reverse<Priority>,
    id: TaskId,
}

impl QueueKey {
    const fn new(priority: Priority, id: TaskId) -> Self {
        Self {
            priority: Reverse(priority),
            id,
        }
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Pending tasks stored in admission order.
///
/// A `BTreeMap` gives ordered iteration for the lookahead scan and O(log n)
/// removal of arbitrary tasks for cancellation.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    tasks: BTreeMap<QueueKey, Task>,
}

impl PriorityQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task.
    pub fn push(&mut self, task: Task) {
        self.tasks.insert(QueueKey::new(task.priority, task.id), task);
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no tasks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// The task that would be considered first.
    #[must_use]
    pub fn peek(&self) -> Option<&Task> {
        self.tasks.values().next()
    }

    /// Remove a specific task.
    pub fn remove(&mut self, id: TaskId, priority: Priority) -> Option<Task> {
        self.tasks.remove(&QueueKey::new(priority, id))
    }

    /// Pop the first task that `admit` accepts.
    ///
    /// The head of the highest class is offered first. If it is refused, up to
    /// `lookahead` further tasks *of the same class* are offered in FIFO order.
    /// Lower classes are never considered while a higher class is waiting.
    pub fn pop_admissible<R, F>(&mut self, lookahead: usize, mut admit: F) -> Option<(Task, R)>
    where
        F: FnMut(&Task) -> Option<R>,
    {
        let head_priority = self.peek()?.priority;
        let (key, grant) = self
            .tasks
            .iter()
            .take_while(|(key, _)| key.priority.0 == head_priority)
            .take(lookahead.saturating_add(1))
            .find_map(|(key, task)| admit(task).map(|grant| (*key, grant)))?;
        self.tasks.remove(&key).map(|task| (task, grant))
    }

    /// Remove every task that has waited at least `max_wait`.
    pub fn drain_stale(&mut self, now: Instant, max_wait: Duration) -> Vec<Task> {
        let stale: Vec<QueueKey> = self
            .tasks
            .iter()
            .filter(|(_, task)| now.saturating_duration_since(task.enqueued_at) >= max_wait)
            .map(|(key, _)| *key)
            .collect();
        stale
            .into_iter()
            .filter_map(|key| self.tasks.remove(&key))
            .collect()
    }

    /// Remove all tasks.
    pub fn drain(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.tasks).into_values().collect()
    }

    /// Enqueue time of the longest-waiting task.
    #[must_use]
    pub fn oldest_enqueued_at(&self) -> Option<Instant> {
        self.tasks.values().map(|task| task.enqueued_at).min()
    }
}
