//! Core scheduling abstractions and token accounting.

pub mod agent_pool;
pub mod audit;
pub mod error;
pub mod executor;
pub mod handle;
pub mod queue;
pub mod retry;
pub mod task;
pub mod token_tracker;

pub use agent_pool::{validate_capability, AgentPool, PoolCounters, PoolStatus, Spawn};
pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use error::{AppResult, ConfigError, ExecutorError, SchedulerError, ValidationError};
pub use executor::{ExecutionReport, ExecutionRequest, Executor, InMemoryExecutor, ScriptedResponse};
pub use handle::{CancelSignal, TaskHandle};
pub use queue::PriorityQueue;
pub use retry::RetryPolicy;
pub use task::{AgentResult, FailureKind, Priority, Task, TaskId, TaskSpec, TaskState, WorkerId};
pub use token_tracker::{LedgerEntry, ReservationId, TokenTracker};
