//! # Prometheus Agent Pool
//!
//! A token-aware scheduler that runs prioritized AI agent tasks on a bounded
//! pool of async workers without exceeding a sliding-window token budget.
//!
//! ## Core Problem Solved
//!
//! Agent workloads are limited by provider rate limits long before they are
//! limited by CPU:
//!
//! - **Token Budgets**: Providers meter tokens per minute, so admission has to
//!   account for both recent usage and work already in flight
//! - **Priority Classes**: Security review must not wait behind optional clean-up
//! - **Uneven Task Sizes**: One long task should not leave prefetched work stuck
//!   behind it while other workers sit idle
//!
//! ## Key Features
//!
//! - **Sliding-Window Ledger**: [`core::TokenTracker`] ages usage out of a
//!   rolling window and reserves estimates at admission
//! - **Priority Queue with Lookahead**: strict class order, FIFO within a class,
//!   bounded lookahead so a small task can pass a large one of the same class
//! - **Work Stealing**: idle workers take prefetched tasks from busy ones
//! - **Retry and Timeouts**: per-attempt deadlines and exponential backoff for
//!   transient executor failures
//! - **Layered Configuration**: explicit values, `AGENT_POOL_*` environment
//!   variables, an `agent-pool.json` project document, then defaults
//!
//! ```rust,ignore
//! use prometheus_agent_pool::config::PoolConfig;
//! use prometheus_agent_pool::core::{AgentPool, InMemoryExecutor, Priority, TaskSpec};
//!
//! let pool = AgentPool::new(PoolConfig::default(), InMemoryExecutor::new())?;
//! let review = pool.submit_task(
//!     TaskSpec::new("security-reviewer", "audit auth module", Priority::Security)
//!         .with_estimated_tokens(12_000),
//! )?;
//! let docs = pool.submit_task(TaskSpec::new("doc-writer", "update README", Priority::Docs))?;
//!
//! let results = pool.await_all(&[review, docs]).await?;
//! println!("{}", prometheus_agent_pool::runtime::status_json(&pool)?);
//! ```
//!
//! For complete scenarios, see:
//! - `tests/agent_pool_test.rs` - admission, priority, retry and fail-fast
//! - `tests/work_stealing_test.rs` - load balancing across workers

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions and token accounting.
pub mod core;
/// Configuration models and layered sources.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Runtime adapters and API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
