//! Admission queue and readiness gate.
//!
//! Pending records are polled for readiness in priority order, at most one is
//! admitted per check, and a fruitless check starts a cool-down before the
//! next one. A record that stays unready while nothing else is starting or
//! running is failed once it has waited past the resource-wait ceiling.

use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::audit::AuditAction;
use super::error::TaskFault;
use super::record::ExecutionRecord;
use super::task::{guarded, guarded_or, TaskResult};
use crate::util::clock::format_duration;

/// A pending record removed with a decided `Failed` outcome.
#[derive(Debug)]
pub struct Rejected {
    /// The record, decided but not finalized.
    pub record: ExecutionRecord,
    /// [`AuditAction::ReadinessFailed`] or [`AuditAction::Starved`].
    pub action: AuditAction,
}

/// Result of one readiness check.
#[derive(Debug, Default)]
pub struct Scan {
    /// The record that reported ready, if any.
    pub admitted: Option<ExecutionRecord>,
    /// Records failed during the scan.
    pub rejected: Vec<Rejected>,
}

/// Records not yet started, in readiness polling order.
#[derive(Debug)]
pub struct AdmissionQueue {
    pending: Vec<ExecutionRecord>,
    last_fruitless_check: Option<Instant>,
    cooldown: Duration,
    wait: Duration,
}

impl AdmissionQueue {
    /// Queue `records`, ordered by ascending priority. Ties keep input order.
    pub fn new(mut records: Vec<ExecutionRecord>, cooldown: Duration, wait: Duration) -> Self {
        records.sort_by_cached_key(|r| guarded_or(r.name(), "priority", 0, || r.task().priority()));
        Self {
            pending: records,
            last_fruitless_check: None,
            cooldown,
            wait,
        }
    }

    /// Whether enough time has passed since the last fruitless check.
    #[must_use]
    pub fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.last_fruitless_check
            .map_or(true, |last| now.saturating_duration_since(last) >= self.cooldown)
    }

    /// Poll pending records until one reports ready.
    ///
    /// `others_in_flight` says whether any record is starting or running;
    /// the resource-wait clock only runs while it is false.
    pub fn scan(&mut self, now: Instant, others_in_flight: bool) -> Scan {
        let mut scan = Scan::default();
        let mut i = 0;
        while i < self.pending.len() {
            let task = std::sync::Arc::clone(self.pending[i].task());
            let name = task.name().to_string();
            match guarded(|| task.is_ready_to_start()) {
                Ok(true) => {
                    let mut record = self.pending.remove(i);
                    record.stamp_ready_check(now);
                    debug!(task = %name, "task is ready to start");
                    scan.admitted = Some(record);
                    break;
                }
                Ok(false) if !others_in_flight => {
                    let first = self.pending[i].stamp_ready_check(now);
                    if now.saturating_duration_since(first) >= self.wait {
                        let mut record = self.pending.remove(i);
                        let reason = format!(
                            "{name} could not acquire resources within {}",
                            format_duration(self.wait)
                        );
                        warn!(task = %name, "{reason}");
                        record.decide(
                            TaskResult::Failed,
                            reason,
                            Some(TaskFault::ResourceStarvation(self.wait)),
                        );
                        scan.rejected.push(Rejected {
                            record,
                            action: AuditAction::Starved,
                        });
                        continue;
                    }
                    i += 1;
                }
                Ok(false) => i += 1,
                Err(e) => {
                    error!(task = %name, error = %e, "readiness check failed, failing task");
                    let mut record = self.pending.remove(i);
                    record.decide(
                        TaskResult::Failed,
                        format!("{name} failed its readiness check: {e}"),
                        Some(TaskFault::Readiness(format!("{e:#}"))),
                    );
                    scan.rejected.push(Rejected {
                        record,
                        action: AuditAction::ReadinessFailed,
                    });
                }
            }
        }
        if scan.admitted.is_none() {
            self.last_fruitless_check = Some(now);
        }
        scan
    }

    /// Remove every pending record.
    pub fn drain(&mut self) -> Vec<ExecutionRecord> {
        std::mem::take(&mut self.pending)
    }

    /// Pending record count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
