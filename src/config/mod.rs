//! Configuration models for the pool and its layered sources.

pub mod pool;

pub use pool::{
    PoolConfig, PoolConfigOverrides, DEFAULT_CAPABILITIES, ENV_PREFIX, MAX_DURATION_SECS,
    MAX_LOCAL_QUEUE_DEPTH, MAX_WORKERS, MIN_WORKERS, PROJECT_DOCUMENT,
};
