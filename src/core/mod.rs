//! Core scheduling: the task capability, per-pass records and the sweep.

pub mod admission;
pub mod audit;
pub mod cancel;
pub mod controller;
pub mod error;
pub mod record;
pub mod report;
pub mod startup;
pub mod sweep;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink};
pub use cancel::{AbortRegistration, AbortRegistry, CancelToken};
pub use controller::PassController;
pub use error::{AppResult, SchedulerError, TaskFault};
pub use record::{ExecutionRecord, TickContext};
pub use report::{
    PassSummary, ReportLevel, ReportLine, ReportSink, Reporter, RunReport, RunTallies, Severity,
    TaskReport, TaskTally,
};
pub use sweep::PartitionCounts;
pub use task::{MaxDurationPolicy, StartContext, StopReason, Task, TaskResult, TaskStatus};
