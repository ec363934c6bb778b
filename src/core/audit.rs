//! Audit trail of scheduling transitions.
//!
//! Every admission, start, completion and forced finalization is recorded as an
//! [`AuditEvent`]. The trail is optional and purely observational; the
//! scheduler never reads it back.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::util::clock::now_ms;

/// Scheduling transition recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Moved from pending to starting; a start attempt follows.
    Admitted,
    /// Start succeeded; moved to running.
    Started,
    /// Start failed or was refused.
    StartFailed,
    /// The readiness predicate failed.
    ReadinessFailed,
    /// Failed after waiting past the resource-wait ceiling.
    Starved,
    /// Restarted in place after asking for a retry.
    Retried,
    /// Reached a terminal result through the tick loop.
    Completed,
    /// Start worker abandoned after cancellation.
    Abandoned,
    /// Still pending when the pass was cancelled.
    CancelledBeforeStart,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Admitted => "admitted",
            Self::Started => "started",
            Self::StartFailed => "start_failed",
            Self::ReadinessFailed => "readiness_failed",
            Self::Starved => "starved",
            Self::Retried => "retried",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
            Self::CancelledBeforeStart => "cancelled_before_start",
        };
        f.write_str(label)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Run identifier.
    pub run_id: Uuid,
    /// Zero-based pass index.
    pub pass: u32,
    /// Task name.
    pub task: String,
    /// Transition taken.
    pub action: AuditAction,
    /// Starting plus running count right after the transition.
    pub in_flight: usize,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Shared sinks can be handed to a controller while the caller keeps a handle.
impl<S: AuditSink> AuditSink for Arc<Mutex<S>> {
    fn record(&mut self, event: AuditEvent) {
        self.lock().record(event);
    }
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }

    /// Count stored events with the given action.
    #[must_use]
    pub fn count(&self, action: AuditAction) -> usize {
        self.events.iter().filter(|e| e.action == action).count()
    }

    /// Highest `in_flight` value seen on any stored event.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.events.iter().map(|e| e.in_flight).max().unwrap_or(0)
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    run_id: Uuid,
    pass: u32,
    task: impl Into<String>,
    action: AuditAction,
    in_flight: usize,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        run_id,
        pass,
        task: task.into(),
        action,
        in_flight,
        created_at_ms: now_ms(),
        detail,
    }
}
