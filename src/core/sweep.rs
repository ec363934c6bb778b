//! One pass over the task set.
//!
//! The controller thread loops on a fixed tick. Each iteration locks the
//! scheduler state, collects start reports, admits at most one pending record,
//! ticks every running record, then releases the lock and sleeps. Records move
//! monotonically pending -> starting -> running -> completed, and
//! starting + running never exceeds the parallelism limit.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use super::admission::AdmissionQueue;
use super::audit::{build_audit_event, AuditAction, AuditSink};
use super::cancel::CancelToken;
use super::error::TaskFault;
use super::record::{ExecutionRecord, TickContext};
use super::report::{PassSummary, Reporter};
use super::startup::{StartReport, StartupPool};
use super::task::{StartContext, Task, TaskResult};
use crate::config::RunOptions;

/// Sizes of the four scheduler partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartitionCounts {
    /// Not yet admitted.
    pub pending: usize,
    /// Start call in flight.
    pub starting: usize,
    /// Started and being ticked.
    pub running: usize,
    /// Finalized.
    pub completed: usize,
}

impl PartitionCounts {
    /// Starting plus running.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.starting + self.running
    }
}

/// Scheduler state of the current pass; guarded by the controller mutex.
#[derive(Debug)]
pub struct SweepState {
    admission: AdmissionQueue,
    starting: BTreeMap<usize, ExecutionRecord>,
    running: Vec<ExecutionRecord>,
    completed: Vec<ExecutionRecord>,
    required: usize,
}

impl Default for SweepState {
    fn default() -> Self {
        Self::new(Vec::new(), Duration::ZERO, Duration::ZERO)
    }
}

impl SweepState {
    /// Fresh state with every record pending.
    pub fn new(records: Vec<ExecutionRecord>, cooldown: Duration, wait: Duration) -> Self {
        let required = records.len();
        Self {
            admission: AdmissionQueue::new(records, cooldown, wait),
            starting: BTreeMap::new(),
            running: Vec::new(),
            completed: Vec::new(),
            required,
        }
    }

    /// Partition sizes.
    #[must_use]
    pub fn counts(&self) -> PartitionCounts {
        PartitionCounts {
            pending: self.admission.len(),
            starting: self.starting.len(),
            running: self.running.len(),
            completed: self.completed.len(),
        }
    }

    fn in_flight(&self) -> usize {
        self.starting.len() + self.running.len()
    }

    fn is_done(&self) -> bool {
        self.completed.len() >= self.required
    }
}

/// Shared audit sink slot.
pub(crate) type SharedAudit = Mutex<Box<dyn AuditSink>>;

/// Everything one pass needs from its controller.
pub(crate) struct Sweep<'a> {
    pub(crate) options: &'a RunOptions,
    pub(crate) cancel: &'a CancelToken,
    pub(crate) reporter: &'a Reporter,
    pub(crate) audit: Option<&'a SharedAudit>,
    pub(crate) state: &'a Mutex<SweepState>,
    pub(crate) run_id: Uuid,
    pub(crate) pass_index: u32,
}

struct PassRun<'a> {
    sweep: Sweep<'a>,
    pool: StartupPool,
    last_status: Instant,
}

impl Sweep<'_> {
    /// Run the pass to completion or cancellation and report it.
    pub(crate) fn run(self, tasks: &[Arc<dyn Task>]) -> PassSummary {
        let span = info_span!(
            "pass",
            pass = self.pass_index + 1,
            of = self.options.iterations
        );
        let _entered = span.enter();

        let records = tasks
            .iter()
            .enumerate()
            .map(|(index, task)| ExecutionRecord::new(index, Arc::clone(task)))
            .collect();
        *self.state.lock() = SweepState::new(
            records,
            self.options.readiness_cooldown(),
            self.options.wait(),
        );
        info!(tasks = tasks.len(), "pass started");

        let started = Instant::now();
        let mut run = PassRun {
            sweep: self,
            pool: StartupPool::new(),
            last_status: started,
        };
        run.sweep_until_done();
        let cancelled = run.sweep.cancel.is_cancelled();
        if cancelled {
            run.cancel_in_flight();
        }

        let reports = run
            .sweep
            .state
            .lock()
            .completed
            .iter()
            .filter_map(|r| r.report().cloned())
            .collect();
        let summary = PassSummary::new(
            run.sweep.pass_index,
            run.sweep.options.iterations,
            started.elapsed(),
            cancelled,
            reports,
        );
        info!(
            passed = summary.passed,
            passed_with_warnings = summary.passed_with_warnings,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled,
            "pass finished"
        );
        run.sweep.reporter.pass_finished(&summary);
        summary
    }
}

impl PassRun<'_> {
    fn sweep_until_done(&mut self) {
        let state_lock = self.sweep.state;
        loop {
            {
                let mut state = state_lock.lock();
                let now = Instant::now();
                self.collect_starts(&mut state, now);
                if self.sweep.cancel.is_cancelled() {
                    return;
                }
                self.admit(&mut state, now);
                self.tick_running(&mut state, now);
                self.status_line(&state, now);
                if state.is_done() {
                    return;
                }
            }
            self.sweep.cancel.sleep(self.sweep.options.tick_interval());
        }
    }

    fn collect_starts(&mut self, state: &mut SweepState, now: Instant) {
        for StartReport {
            index,
            outcome,
            began,
            ended,
        } in self.pool.drain()
        {
            let Some(mut record) = state.starting.remove(&index) else {
                continue;
            };
            match outcome.fault() {
                None => {
                    record.mark_started(began, ended);
                    info!(task = %record.name(), "task started");
                    let name = record.name().to_string();
                    state.running.push(record);
                    self.record_event(&name, AuditAction::Started, state.in_flight(), None);
                }
                Some(fault) => {
                    warn!(task = %record.name(), %fault, "task failed to start");
                    let detail = fault.to_string();
                    record.mark_start_failed(began, ended, fault);
                    record.finalize(&self.sweep.options.invoker, now, true);
                    self.complete(state, record, AuditAction::StartFailed, Some(detail));
                }
            }
        }
    }

    fn admit(&mut self, state: &mut SweepState, now: Instant) {
        let parallel = self.sweep.options.parallel;
        if state.in_flight() >= parallel
            || state.admission.is_empty()
            || !state.admission.cooldown_elapsed(now)
        {
            return;
        }
        let others_in_flight = state.in_flight() > 0;
        let scan = state.admission.scan(now, others_in_flight);

        for rejected in scan.rejected {
            let mut record = rejected.record;
            let detail = record.fault().map(ToString::to_string);
            record.finalize(&self.sweep.options.invoker, now, false);
            self.complete(state, record, rejected.action, detail);
        }

        let Some(record) = scan.admitted else {
            return;
        };
        let index = record.index();
        let task = Arc::clone(record.task());
        let ctx = StartContext {
            pass_index: self.sweep.pass_index,
            total_passes: self.sweep.options.iterations,
            cancel: self.sweep.cancel.clone(),
        };
        state.starting.insert(index, record);
        let in_flight = state.in_flight();
        debug_assert!(in_flight <= parallel);
        info!(task = %task.name(), in_flight, parallel, "admitting task");
        self.record_event(task.name(), AuditAction::Admitted, in_flight, None);

        if let Err(e) = self.pool.launch(index, Arc::clone(&task), ctx) {
            warn!(task = %task.name(), error = %e, "could not launch start worker");
            if let Some(mut record) = state.starting.remove(&index) {
                let fault = TaskFault::Start(e.to_string());
                let detail = fault.to_string();
                record.mark_start_failed(now, now, fault);
                record.finalize(&self.sweep.options.invoker, now, true);
                self.complete(state, record, AuditAction::StartFailed, Some(detail));
            }
        }
    }

    fn tick_running(&mut self, state: &mut SweepState, now: Instant) {
        let ctx = TickContext {
            now,
            cancelled: self.sweep.cancel.is_cancelled(),
            no_timeout: self.sweep.options.no_timeout,
            invoker: &self.sweep.options.invoker,
        };
        let running = std::mem::take(&mut state.running);
        for mut record in running {
            let retries = record.retries();
            match record.tick(&ctx) {
                None => {
                    if record.retries() > retries {
                        let in_flight = state.in_flight() + 1;
                        self.record_event(record.name(), AuditAction::Retried, in_flight, None);
                    }
                    state.running.push(record);
                }
                Some(result) => {
                    self.complete(state, record, AuditAction::Completed, Some(result.to_string()));
                }
            }
        }
    }

    fn status_line(&mut self, state: &SweepState, now: Instant) {
        if now.saturating_duration_since(self.last_status) < self.sweep.options.status_interval() {
            return;
        }
        self.last_status = now;
        let counts = state.counts();
        let running: Vec<&str> = state.running.iter().map(ExecutionRecord::name).collect();
        info!(
            pending = counts.pending,
            starting = counts.starting,
            running = counts.running,
            completed = counts.completed,
            required = state.required,
            tasks = ?running,
            "pass status"
        );
    }

    /// Wait out the grace period, then force-finalize whatever is left.
    fn cancel_in_flight(&mut self) {
        let options = self.sweep.options;
        let state_lock = self.sweep.state;
        let deadline = Instant::now() + options.grace_period();
        let step = options.tick_interval().min(Duration::from_millis(50));
        info!(grace_ms = options.grace_period_ms, "pass cancelled, waiting for acknowledgement");

        if !self.sweep.cancel.wait_for_ack(options.grace_period()) {
            warn!("abort was not acknowledged within the grace period");
        }
        loop {
            {
                let mut state = state_lock.lock();
                self.collect_starts(&mut state, Instant::now());
                if state.starting.is_empty() {
                    break;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                warn!("grace period elapsed before every start worker returned");
                break;
            }
            thread::sleep(step.min(deadline - now));
        }

        let invoker = options.invoker.as_str();
        let mut state = state_lock.lock();
        let now = Instant::now();

        let starting = std::mem::take(&mut state.starting);
        for (index, mut record) in starting {
            self.pool.abandon(index);
            let reason = format!("{} was still starting when the run was cancelled", record.name());
            record.decide(TaskResult::Cancelled, reason, Some(TaskFault::Abandoned));
            record.finalize(invoker, now, true);
            self.complete(&mut state, record, AuditAction::Abandoned, None);
        }

        self.tick_running(&mut state, now);
        let running = std::mem::take(&mut state.running);
        for mut record in running {
            let reason = format!("Cancelling {} on request", record.name());
            record.decide(TaskResult::Cancelled, reason, None);
            record.finalize(invoker, now, true);
            self.complete(&mut state, record, AuditAction::Completed, Some(TaskResult::Cancelled.to_string()));
        }

        for mut record in state.admission.drain() {
            record.decide(TaskResult::Cancelled, "cancelled before start".into(), None);
            record.finalize(invoker, now, false);
            self.complete(&mut state, record, AuditAction::CancelledBeforeStart, None);
        }
    }

    /// Move a finalized record to completed and stream its report.
    fn complete(
        &self,
        state: &mut SweepState,
        record: ExecutionRecord,
        action: AuditAction,
        detail: Option<String>,
    ) {
        if let Some(report) = record.report() {
            self.sweep.reporter.task_finished(report);
        }
        let in_flight = state.in_flight();
        self.record_event(record.name(), action, in_flight, detail);
        state.completed.push(record);
    }

    fn record_event(&self, task: &str, action: AuditAction, in_flight: usize, detail: Option<String>) {
        if let Some(audit) = self.sweep.audit {
            let event = build_audit_event(
                self.sweep.run_id,
                self.sweep.pass_index,
                task,
                action,
                in_flight,
                detail,
            );
            audit.lock().record(event);
        }
    }
}
