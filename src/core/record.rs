//! Per-pass execution record and the per-task result state machine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::error::TaskFault;
use super::report::TaskReport;
use super::task::{guarded, guarded_or, MaxDurationPolicy, StopReason, Task, TaskResult, TaskStatus};
use crate::util::clock::format_duration;

/// Inputs to a single tick of a running record.
#[derive(Debug, Clone, Copy)]
pub struct TickContext<'a> {
    /// Tick timestamp.
    pub now: Instant,
    /// Whether the shared cancellation flag is set.
    pub cancelled: bool,
    /// Whether task timeouts are globally disabled.
    pub no_timeout: bool,
    /// Invoker for run-locally hints.
    pub invoker: &'a str,
}

/// One task's execution within one pass.
///
/// A record is created when a pass starts and dropped when it ends. The
/// outcome is `None` while the task is still in progress.
pub struct ExecutionRecord {
    index: usize,
    task: Arc<dyn Task>,
    first_ready_check: Option<Instant>,
    setup_began: Option<Instant>,
    setup_ended: Option<Instant>,
    test_ended: Option<Instant>,
    final_result: Option<TaskResult>,
    cancellation_reason: Option<String>,
    fault: Option<TaskFault>,
    retries: u32,
    report: Option<TaskReport>,
}

impl std::fmt::Debug for ExecutionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRecord")
            .field("index", &self.index)
            .field("task", &self.task.name())
            .field("final_result", &self.final_result)
            .field("fault", &self.fault)
            .field("finalized", &self.is_finalized())
            .finish_non_exhaustive()
    }
}

impl ExecutionRecord {
    /// Fresh record for the task at `index` in the run's task list.
    pub fn new(index: usize, task: Arc<dyn Task>) -> Self {
        Self {
            index,
            task,
            first_ready_check: None,
            setup_began: None,
            setup_ended: None,
            test_ended: None,
            final_result: None,
            cancellation_reason: None,
            fault: None,
            retries: 0,
            report: None,
        }
    }

    /// Position of the task in the run's task list.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// The task this record executes.
    #[must_use]
    pub fn task(&self) -> &Arc<dyn Task> {
        &self.task
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// First instant the task was evaluated for readiness.
    #[must_use]
    pub const fn first_ready_check(&self) -> Option<Instant> {
        self.first_ready_check
    }

    /// When the start call began.
    #[must_use]
    pub const fn setup_began(&self) -> Option<Instant> {
        self.setup_began
    }

    /// When the start call returned successfully.
    #[must_use]
    pub const fn setup_ended(&self) -> Option<Instant> {
        self.setup_ended
    }

    /// Decided outcome; `None` while still in progress.
    #[must_use]
    pub const fn final_result(&self) -> Option<TaskResult> {
        self.final_result
    }

    /// Why the scheduler ended the task, if it did.
    #[must_use]
    pub fn cancellation_reason(&self) -> Option<&str> {
        self.cancellation_reason.as_deref()
    }

    /// Collaborator fault behind the outcome, if any.
    #[must_use]
    pub const fn fault(&self) -> Option<&TaskFault> {
        self.fault.as_ref()
    }

    /// Number of in-place restarts.
    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }

    /// Whether the record reached a terminal result and was reported.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.report.is_some()
    }

    /// Report captured at finalization.
    #[must_use]
    pub const fn report(&self) -> Option<&TaskReport> {
        self.report.as_ref()
    }

    /// Time between the first readiness check and the start call.
    #[must_use]
    pub fn wait_duration(&self) -> Duration {
        span(self.first_ready_check, self.setup_began)
    }

    /// Time spent in the start call.
    #[must_use]
    pub fn setup_duration(&self) -> Duration {
        span(self.setup_began, self.setup_ended)
    }

    /// Time between the end of setup and the end of the test.
    #[must_use]
    pub fn test_duration(&self) -> Duration {
        span(self.setup_ended, self.test_ended)
    }

    /// Stamp the first readiness check if unset; returns the stamped instant.
    pub fn stamp_ready_check(&mut self, now: Instant) -> Instant {
        *self.first_ready_check.get_or_insert(now)
    }

    /// Record a successful start.
    pub(crate) fn mark_started(&mut self, began: Instant, ended: Instant) {
        self.setup_began = Some(began);
        self.setup_ended = Some(ended);
    }

    /// Record a failed start; the outcome is decided but not yet finalized.
    pub(crate) fn mark_start_failed(&mut self, began: Instant, ended: Instant, fault: TaskFault) {
        self.setup_began = Some(began);
        self.setup_ended = Some(ended);
        self.test_ended = Some(ended);
        let reason = format!("{} failed to start: {fault}", self.task.name());
        self.decide(TaskResult::Failed, reason, Some(fault));
    }

    /// Decide an outcome outside the tick loop. Ignored once finalized.
    pub(crate) fn decide(&mut self, result: TaskResult, reason: String, fault: Option<TaskFault>) {
        if self.is_finalized() {
            return;
        }
        self.final_result = Some(result);
        self.cancellation_reason = Some(reason);
        if fault.is_some() {
            self.fault = fault;
        }
    }

    /// Tick a running record once.
    ///
    /// Returns the decided outcome, or `None` while the task is still in
    /// progress (including right after a successful in-place restart). A
    /// finalized record returns its outcome without touching the task.
    pub fn tick(&mut self, ctx: &TickContext<'_>) -> Option<TaskResult> {
        if self.is_finalized() {
            return self.final_result;
        }
        let task = Arc::clone(&self.task);
        let name = task.name().to_string();

        if let Err(e) = guarded(|| task.tick()) {
            self.fail_tick(&name, &e);
        }

        let observed = guarded(|| Ok((task.status(), task.max_duration(), task.max_duration_policy())));
        let (status, max_duration, policy) = observed.unwrap_or_else(|e| {
            self.fail_tick(&name, &e);
            (TaskStatus::InProgress, Duration::MAX, MaxDurationPolicy::Failure)
        });

        let mut running = status == TaskStatus::InProgress;
        let elapsed = self
            .setup_ended
            .map_or(Duration::ZERO, |t| ctx.now.saturating_duration_since(t));
        if running && self.final_result.is_none() && !ctx.no_timeout && elapsed > max_duration {
            match policy {
                MaxDurationPolicy::Failure => {
                    let reason = format!(
                        "Terminating {name} due to maximum duration of {}",
                        format_duration(max_duration)
                    );
                    warn!(task = %name, "{reason}");
                    self.final_result = Some(TaskResult::TimedOut);
                    self.cancellation_reason = Some(reason);
                }
                MaxDurationPolicy::Success => {
                    info!(
                        task = %name,
                        max_duration = %format_duration(max_duration),
                        "task reached its maximum duration, ending it as passed"
                    );
                    self.final_result = Some(TaskResult::Passed);
                    running = false;
                }
            }
        }

        if ctx.cancelled {
            self.final_result = Some(TaskResult::Cancelled);
            self.cancellation_reason = Some(format!("Cancelling {name} on request"));
        }

        if running && self.final_result.is_none() {
            return None;
        }

        let stop_reason = if running && self.final_result != Some(TaskResult::Passed) {
            StopReason::MaxDuration
        } else {
            StopReason::Completed
        };

        match guarded(|| task.stop(stop_reason)) {
            Ok(()) => {
                self.test_ended = Some(ctx.now);
                let decided = match guarded(|| Ok(task.result())) {
                    Ok(reported) => *self.final_result.get_or_insert(reported),
                    Err(e) => {
                        self.fail_tick(&name, &e);
                        self.final_result.unwrap_or(TaskResult::Cancelled)
                    }
                };

                if decided == TaskResult::WantRetry {
                    info!(task = %name, "task requested a retry, restarting in place");
                    match guarded(|| task.restart()) {
                        Ok(true) => {
                            self.retries += 1;
                            self.final_result = None;
                            self.cancellation_reason = None;
                            self.fault = None;
                            self.test_ended = None;
                            return None;
                        }
                        Ok(false) => {
                            error!(task = %name, "task failed to restart, marking it failed");
                            self.final_result = Some(TaskResult::Failed);
                            self.cancellation_reason = Some(format!("{name} failed to restart"));
                            self.fault = Some(TaskFault::RestartRefused);
                        }
                        Err(e) => {
                            error!(task = %name, error = %e, "task restart failed, marking it failed");
                            self.final_result = Some(TaskResult::Failed);
                            self.cancellation_reason = Some(format!("{name} failed to restart: {e}"));
                            self.fault = Some(TaskFault::Restart(format!("{e:#}")));
                        }
                    }
                }
            }
            Err(e) => {
                // Cancellation races make stop failures on running tasks expected.
                if running {
                    warn!(task = %name, error = %e, "cancelled task failed while stopping");
                } else {
                    error!(task = %name, error = %e, "task failed while stopping");
                }
                self.test_ended = Some(ctx.now);
                if matches!(self.final_result, None | Some(TaskResult::WantRetry)) {
                    self.final_result = Some(TaskResult::Failed);
                    self.cancellation_reason = Some(format!("{name} failed while stopping: {e}"));
                }
                if self.fault.is_none() {
                    self.fault = Some(TaskFault::Stop(format!("{e:#}")));
                }
            }
        }

        self.finalize(ctx.invoker, ctx.now, true);
        self.final_result
    }

    /// Cancel an undecided record after a tick-path fault. A decided outcome
    /// stands; the fault is kept only if none was recorded yet.
    fn fail_tick(&mut self, name: &str, e: &anyhow::Error) {
        error!(task = %name, error = %e, "task failed during tick, ending it");
        if self.final_result.is_none() {
            self.final_result = Some(TaskResult::Cancelled);
            self.cancellation_reason = Some(format!("{name} failed during tick: {e}"));
        }
        if self.fault.is_none() {
            self.fault = Some(TaskFault::Tick(format!("{e:#}")));
        }
    }

    /// Capture the report, persist the outcome onto the task and optionally run
    /// its cleanup. Runs at most once per record.
    pub(crate) fn finalize(&mut self, invoker: &str, now: Instant, cleanup: bool) {
        if self.is_finalized() {
            return;
        }
        let result = match self.final_result {
            Some(TaskResult::WantRetry) | None => TaskResult::Failed,
            Some(result) => result,
        };
        self.final_result = Some(result);
        if self.setup_began.is_some() && self.test_ended.is_none() {
            self.test_ended = Some(now);
        }

        let report = TaskReport::capture(self, invoker);
        let task = Arc::clone(&self.task);
        let name = task.name();
        guarded_or(name, "set_result", (), || task.set_result(result));
        let reason = self.cancellation_reason.as_deref().unwrap_or("");
        guarded_or(name, "set_cancellation_reason", (), || task.set_cancellation_reason(reason));
        if cleanup {
            if let Err(e) = guarded(|| task.cleanup()) {
                warn!(task = %name, error = %e, "task cleanup failed");
            }
        }
        self.report = Some(report);
    }
}

fn span(from: Option<Instant>, to: Option<Instant>) -> Duration {
    match (from, to) {
        (Some(from), Some(to)) => to.saturating_duration_since(from),
        _ => Duration::ZERO,
    }
}
