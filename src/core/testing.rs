//! Minimal task used by unit tests in this module tree.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::error::AppResult;
use super::task::{StartContext, StopReason, Task, TaskResult, TaskStatus};

pub(crate) const NOT_READY: u8 = 0;
pub(crate) const READY: u8 = 1;
pub(crate) const BROKEN: u8 = 2;

/// Starts instantly and completes on its first tick with `Passed`.
pub(crate) struct StubTask {
    name: String,
    priority: i32,
    readiness: AtomicU8,
    pub(crate) readiness_checks: AtomicU32,
    pub(crate) starts: AtomicU32,
    pub(crate) cleanups: AtomicU32,
    pub(crate) persisted: Mutex<Option<TaskResult>>,
}

impl StubTask {
    pub(crate) fn new(name: &str, priority: i32, readiness: u8) -> Self {
        Self {
            name: name.to_string(),
            priority,
            readiness: AtomicU8::new(readiness),
            readiness_checks: AtomicU32::new(0),
            starts: AtomicU32::new(0),
            cleanups: AtomicU32::new(0),
            persisted: Mutex::new(None),
        }
    }

    pub(crate) fn set_readiness(&self, readiness: u8) {
        self.readiness.store(readiness, Ordering::SeqCst);
    }
}

impl Task for StubTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn max_duration(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn is_ready_to_start(&self) -> AppResult<bool> {
        self.readiness_checks.fetch_add(1, Ordering::SeqCst);
        match self.readiness.load(Ordering::SeqCst) {
            READY => Ok(true),
            BROKEN => anyhow::bail!("device query failed"),
            _ => Ok(false),
        }
    }

    fn start(&self, _ctx: &StartContext) -> AppResult<bool> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn tick(&self) -> AppResult<()> {
        Ok(())
    }

    fn status(&self) -> TaskStatus {
        TaskStatus::Complete
    }

    fn stop(&self, _reason: StopReason) -> AppResult<()> {
        Ok(())
    }

    fn result(&self) -> TaskResult {
        TaskResult::Passed
    }

    fn restart(&self) -> AppResult<bool> {
        Ok(false)
    }

    fn cleanup(&self) -> AppResult<()> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_cancellation_reason(&self, _reason: &str) {}

    fn set_result(&self, result: TaskResult) {
        *self.persisted.lock() = Some(result);
    }

    fn summary(&self) -> String {
        format!("{} summary", self.name)
    }

    fn run_locally_hint(&self, invoker: &str) -> String {
        format!("{invoker} -test={}", self.name)
    }
}
