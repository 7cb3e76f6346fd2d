//! Audit sink for task lifecycle events.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::core::task::{TaskId, WorkerId};
use crate::util::clock::now_ms;

/// Lifecycle step recorded by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Accepted into the global queue.
    Submitted,
    /// Rejected by validation.
    Rejected,
    /// Budget reserved and handed to a worker.
    Admitted,
    /// Taken from another worker's local queue.
    Stolen,
    /// Executor invocation started.
    Started,
    /// Transient failure, another attempt follows.
    Retried,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Final attempt hit its deadline.
    TimedOut,
    /// Cancelled.
    Cancelled,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitted => "submitted",
            Self::Rejected => "rejected",
            Self::Admitted => "admitted",
            Self::Stolen => "stolen",
            Self::Started => "started",
            Self::Retried => "retried",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Related task, absent for rejected submissions.
    pub task_id: Option<TaskId>,
    /// Worker involved, if any.
    pub worker_id: Option<WorkerId>,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Lets callers keep a handle on a sink the pool owns.
impl<S: AuditSink> AuditSink for Arc<Mutex<S>> {
    fn record(&mut self, event: AuditEvent) {
        self.lock().record(event);
    }
}

/// Helper to build an audit event stamped with the current time.
pub fn build_audit_event(
    task_id: Option<TaskId>,
    worker_id: Option<WorkerId>,
    action: AuditAction,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        task_id,
        worker_id,
        action,
        created_at_ms: now_ms(),
        detail,
    }
}
