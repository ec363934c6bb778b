//! Task capability surface consumed by the scheduler.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::cancel::CancelToken;
use super::error::AppResult;

/// Outcome of a task, as reported by the task or decided by the scheduler.
///
/// "Still in progress" is not a variant: records hold `Option<TaskResult>`
/// and `None` means no outcome has been decided yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    /// The task never ran.
    NotStarted,
    /// The task finished successfully.
    Passed,
    /// The task finished with a failure.
    Failed,
    /// The task exceeded its maximum duration.
    TimedOut,
    /// The task decided not to run.
    Skipped,
    /// The task was cancelled, on request or after a tick fault.
    Cancelled,
    /// The task asks to be restarted in place.
    WantRetry,
}

impl TaskResult {
    /// Whether this result counts against the pass.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Passed | Self::Skipped)
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "NotStarted",
            Self::Passed => "Passed",
            Self::Failed => "Failed",
            Self::TimedOut => "TimedOut",
            Self::Skipped => "Skipped",
            Self::Cancelled => "Cancelled",
            Self::WantRetry => "WantRetry",
        };
        f.write_str(label)
    }
}

/// Execution status reported by a running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task is still doing work.
    InProgress,
    /// The task has finished on its own.
    Complete,
}

/// What happens when a task runs past its maximum duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxDurationPolicy {
    /// The task is stopped and marked timed out.
    #[default]
    Failure,
    /// The task is stopped and marked passed (wall-clock budgeted tasks).
    Success,
}

/// Why the scheduler is stopping a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The task finished (or its outcome was decided) cooperatively.
    Completed,
    /// The task is being stopped while it still reports itself running.
    MaxDuration,
}

/// Context handed to [`Task::start`].
#[derive(Debug, Clone)]
pub struct StartContext {
    /// Zero-based pass index.
    pub pass_index: u32,
    /// Total number of passes in the run.
    pub total_passes: u32,
    /// Cancellation token the task may poll to return early.
    pub cancel: CancelToken,
}

/// A schedulable test task.
///
/// Implementations are shared between the controller thread and a start
/// worker thread, so every method takes `&self`; use interior mutability for
/// task state. Fallible calls return [`AppResult`] and never need to panic: an
/// `Err` (or a panic) is converted into a scheduler outcome for that task only.
pub trait Task: Send + Sync {
    /// Display name, unique within a run.
    fn name(&self) -> &str;

    /// Readiness polling order; lower values are checked first.
    fn priority(&self) -> i32 {
        0
    }

    /// Execution deadline measured from the end of setup.
    fn max_duration(&self) -> Duration;

    /// Outcome applied when the execution deadline is exceeded.
    fn max_duration_policy(&self) -> MaxDurationPolicy {
        MaxDurationPolicy::Failure
    }

    /// Whether the resources this task needs are currently available.
    ///
    /// # Errors
    ///
    /// Any error fails the task immediately; it is never retried.
    fn is_ready_to_start(&self) -> AppResult<bool>;

    /// Start the task. Runs on a dedicated worker thread and may block.
    ///
    /// # Errors
    ///
    /// An error (or `Ok(false)`) fails the task before it enters the running pool.
    fn start(&self, ctx: &StartContext) -> AppResult<bool>;

    /// Advance the task's own progress. Called once per scheduler tick.
    ///
    /// # Errors
    ///
    /// An error cancels the task.
    fn tick(&self) -> AppResult<()>;

    /// Current execution status.
    fn status(&self) -> TaskStatus;

    /// Stop the task.
    ///
    /// # Errors
    ///
    /// Errors are logged; the task is failed if no outcome was decided yet.
    fn stop(&self, reason: StopReason) -> AppResult<()>;

    /// The task's own view of its outcome, read after [`Task::stop`].
    fn result(&self) -> TaskResult;

    /// Restart in place after reporting [`TaskResult::WantRetry`].
    ///
    /// # Errors
    ///
    /// An error (or `Ok(false)`) fails the task.
    fn restart(&self) -> AppResult<bool>;

    /// Release everything the task acquired.
    ///
    /// # Errors
    ///
    /// Errors are logged and otherwise ignored.
    fn cleanup(&self) -> AppResult<()>;

    /// Record why the scheduler ended the task, empty when it ended on its own.
    fn set_cancellation_reason(&self, reason: &str);

    /// Persist the final outcome onto the task.
    fn set_result(&self, result: TaskResult);

    /// Warnings raised during execution.
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }

    /// Errors raised during execution.
    fn errors(&self) -> Vec<String> {
        Vec::new()
    }

    /// Multi-line human readable summary.
    fn summary(&self) -> String;

    /// Command line that reproduces this task locally.
    fn run_locally_hint(&self, invoker: &str) -> String;
}

/// Run a collaborator call, turning a panic into an error.
pub(crate) fn guarded<T>(call: impl FnOnce() -> AppResult<T>) -> AppResult<T> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Run an infallible collaborator call, returning `fallback` if it panics.
pub(crate) fn guarded_or<T>(task: &str, call: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match guarded(|| Ok(f())) {
        Ok(value) => value,
        Err(e) => {
            warn!(task = %task, call = %call, error = %e, "task call panicked, using fallback");
            fallback
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
