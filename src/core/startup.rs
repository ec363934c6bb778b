//! Start workers: one dedicated thread per admitted task.
//!
//! `Task::start` may block for a long time (booting a device, launching a
//! process), so it never runs on the controller thread. Each worker reports
//! back over a channel; the controller drains reports at the top of every tick.
//! Workers that do not return after cancellation are detached.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, warn};

use super::error::{SchedulerError, TaskFault};
use super::task::{guarded, StartContext, Task};

/// How a start attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// `start` returned true.
    Started,
    /// `start` returned false.
    Refused,
    /// `start` failed or panicked.
    Failed(String),
}

impl StartOutcome {
    /// Fault to attach when the start did not succeed.
    #[must_use]
    pub fn fault(&self) -> Option<TaskFault> {
        match self {
            Self::Started => None,
            Self::Refused => Some(TaskFault::StartRefused),
            Self::Failed(e) => Some(TaskFault::Start(e.clone())),
        }
    }
}

/// Message sent by a start worker when `start` returns.
#[derive(Debug, Clone)]
pub struct StartReport {
    /// Record index of the task.
    pub index: usize,
    /// Start outcome.
    pub outcome: StartOutcome,
    /// When the start call began.
    pub began: Instant,
    /// When the start call returned.
    pub ended: Instant,
}

/// Tracks in-flight start workers for one pass.
pub struct StartupPool {
    tx: Sender<StartReport>,
    rx: Receiver<StartReport>,
    workers: HashMap<usize, JoinHandle<()>>,
}

impl std::fmt::Debug for StartupPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupPool")
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

impl Default for StartupPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupPool {
    /// Empty pool.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            workers: HashMap::new(),
        }
    }

    /// Spawn a worker that calls `task.start(ctx)` and reports back.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Spawn`] if the OS refuses a new thread.
    pub fn launch(
        &mut self,
        index: usize,
        task: Arc<dyn Task>,
        ctx: StartContext,
    ) -> Result<(), SchedulerError> {
        let tx = self.tx.clone();
        let name = task.name().to_string();
        let handle = thread::Builder::new()
            .name(format!("start-{name}"))
            .spawn(move || {
                debug!(task = %name, "start worker running");
                let began = Instant::now();
                let outcome = match guarded(|| task.start(&ctx)) {
                    Ok(true) => StartOutcome::Started,
                    Ok(false) => StartOutcome::Refused,
                    Err(e) => StartOutcome::Failed(format!("{e:#}")),
                };
                let report = StartReport {
                    index,
                    outcome,
                    began,
                    ended: Instant::now(),
                };
                // The receiver is gone if the pass abandoned this worker.
                if tx.send(report).is_err() {
                    debug!(task = %name, "start report dropped, worker was abandoned");
                }
            })
            .map_err(|e| SchedulerError::Spawn(e.to_string()))?;
        self.workers.insert(index, handle);
        Ok(())
    }

    /// Collect every report that has arrived, joining the finished workers.
    pub fn drain(&mut self) -> Vec<StartReport> {
        let reports: Vec<StartReport> = self.rx.try_iter().collect();
        for report in &reports {
            if let Some(handle) = self.workers.remove(&report.index) {
                if handle.join().is_err() {
                    warn!(index = report.index, "start worker panicked after reporting");
                }
            }
        }
        reports
    }

    /// Detach the worker for `index` without waiting for it.
    pub fn abandon(&mut self, index: usize) {
        if self.workers.remove(&index).is_some() {
            warn!(index, "start worker did not return within the grace period, detaching");
        }
    }

    /// Number of workers that have not reported yet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether every worker has reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
