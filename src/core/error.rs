//! Error types for scheduler operations.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Run options failed validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    /// The run was given no tasks.
    #[error("no tasks to run")]
    NoTasks,
    /// The OS refused to spawn a start worker.
    #[error("failed to spawn start worker: {0}")]
    Spawn(String),
    /// Internal failure (adapter join error, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Fault payload attached to an execution record.
///
/// Kept apart from [`TaskResult`](crate::core::TaskResult): the result says
/// how a task ended, the fault says which collaborator call went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TaskFault {
    /// The readiness predicate failed.
    #[error("readiness check failed: {0}")]
    Readiness(String),
    /// `start` returned false.
    #[error("task refused to start")]
    StartRefused,
    /// `start` failed.
    #[error("start failed: {0}")]
    Start(String),
    /// The task waited past the resource-wait ceiling.
    #[error("could not acquire resources within {0:?}")]
    ResourceStarvation(Duration),
    /// `tick` failed; the task is considered unrecoverable.
    #[error("tick failed: {0}")]
    Tick(String),
    /// `stop` failed.
    #[error("stop failed: {0}")]
    Stop(String),
    /// `restart` returned false.
    #[error("task refused to restart")]
    RestartRefused,
    /// `restart` failed.
    #[error("restart failed: {0}")]
    Restart(String),
    /// The start worker did not return within the grace period.
    #[error("start worker abandoned after cancellation")]
    Abandoned,
}

/// Application-facing result using anyhow for collaborator calls.
pub type AppResult<T> = Result<T, anyhow::Error>;
