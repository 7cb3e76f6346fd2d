//! Runtime adapters and API surface.

pub mod api;
pub mod tokio_spawner;

pub use api::{health, status_json, submit_json, submit_task, task_status, Health, TaskStatusResponse, TaskSubmission};
pub use tokio_spawner::TokioSpawner;
