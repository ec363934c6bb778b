//! Pass controller: runs repeated passes and aggregates their outcome.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use super::audit::AuditSink;
use super::cancel::{AbortRegistry, CancelToken};
use super::error::SchedulerError;
use super::report::{Reporter, RunReport, RunTallies};
use super::sweep::{PartitionCounts, SharedAudit, Sweep, SweepState};
use super::task::Task;
use crate::config::RunOptions;

/// Runs a task set for the configured number of passes.
///
/// Construct through [`RunBuilder`](crate::builders::RunBuilder). The
/// controller may be shared across threads: [`snapshot`](Self::snapshot) and
/// [`abort`](Self::abort) are safe to call while [`run`](Self::run) is active.
/// Once aborted, a controller stays cancelled.
pub struct PassController {
    options: RunOptions,
    cancel: CancelToken,
    registry: Arc<AbortRegistry>,
    audit: Option<SharedAudit>,
    reporter: Reporter,
    state: Mutex<SweepState>,
}

impl std::fmt::Debug for PassController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassController")
            .field("options", &self.options)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl PassController {
    pub(crate) fn new(
        options: RunOptions,
        registry: Arc<AbortRegistry>,
        audit: Option<Box<dyn AuditSink>>,
        reporter: Reporter,
    ) -> Self {
        Self {
            options,
            cancel: CancelToken::new(),
            registry,
            audit: audit.map(Mutex::new),
            reporter,
            state: Mutex::new(SweepState::default()),
        }
    }

    /// Options this controller runs with.
    #[must_use]
    pub const fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Cancellation token shared with every task start.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Partition sizes of the current (or last) pass.
    #[must_use]
    pub fn snapshot(&self) -> PartitionCounts {
        self.state.lock().counts()
    }

    /// Cancel this controller's run: set the flag, then acknowledge it.
    pub fn abort(&self) {
        self.cancel.cancel();
        self.cancel.acknowledge();
    }

    /// Run every pass over `tasks`.
    ///
    /// Abort handlers are registered with the controller's [`AbortRegistry`]
    /// for the duration of the call. Task failures never surface as `Err`;
    /// they are reflected in the returned report.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidOptions`] or [`SchedulerError::NoTasks`] before
    /// any pass starts.
    pub fn run(&self, tasks: &[Arc<dyn Task>]) -> Result<RunReport, SchedulerError> {
        self.options
            .validate()
            .map_err(SchedulerError::InvalidOptions)?;
        if tasks.is_empty() {
            return Err(SchedulerError::NoTasks);
        }

        let run_id = Uuid::new_v4();
        let span = info_span!("test_run", %run_id);
        let _entered = span.enter();

        let (on_abort, on_post_abort) = (self.cancel.clone(), self.cancel.clone());
        let _registration = self
            .registry
            .register(move || on_abort.cancel(), move || on_post_abort.acknowledge());

        let iterations = self.options.iterations;
        info!(
            tasks = tasks.len(),
            iterations,
            parallel = self.options.parallel,
            "starting test run"
        );

        let mut tallies = RunTallies::new(tasks.iter().map(|t| t.name()));
        let mut passes = Vec::new();
        for pass_index in 0..iterations {
            if self.cancel.is_cancelled() {
                info!(pass = pass_index + 1, "run cancelled, skipping remaining passes");
                break;
            }
            if pass_index > 0 && self.cancel.sleep(self.options.pass_cooldown()) {
                info!(pass = pass_index + 1, "run cancelled during pass cool-down");
                break;
            }

            let summary = Sweep {
                options: &self.options,
                cancel: &self.cancel,
                reporter: &self.reporter,
                audit: self.audit.as_ref(),
                state: &self.state,
                run_id,
                pass_index,
            }
            .run(tasks);
            tallies.absorb(&summary);
            let failed = summary.had_failure();
            passes.push(summary);

            if failed && self.options.stop_on_error {
                warn!(pass = pass_index + 1, "pass had failures, stopping on error");
                break;
            }
        }

        if iterations > 1 {
            self.reporter.run_finished(&tallies, passes.len());
        }

        let cancelled = self.cancel.is_cancelled();
        let success = !cancelled && passes.iter().all(|p| !p.had_failure());
        info!(passes = passes.len(), success, cancelled, "test run finished");
        Ok(RunReport {
            run_id,
            passes,
            tallies,
            cancelled,
            success,
        })
    }
}
