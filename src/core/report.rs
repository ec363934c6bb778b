//! Reporting: per-task reports, pass summaries and cross-pass tallies.
//!
//! Rendering is pure (`render_*` return [`ReportLine`]s); the [`Reporter`]
//! decides when to render and hands the lines to a [`ReportSink`].

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use super::error::TaskFault;
use super::record::ExecutionRecord;
use super::task::{guarded_or, TaskResult};
use crate::util::clock::{as_millis_u64, format_duration};

/// Severity of a rendered line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLevel {
    /// Informational.
    Info,
    /// Warning.
    Warning,
    /// Error.
    Error,
}

/// One rendered report line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLine {
    /// Line severity.
    pub level: ReportLevel,
    /// Line text.
    pub text: String,
}

impl ReportLine {
    fn new(level: ReportLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }

    fn info(text: impl Into<String>) -> Self {
        Self::new(ReportLevel::Info, text)
    }

    /// Level a task-provided line by its content: lines mentioning `Error:` or
    /// `Warning:` are raised accordingly.
    #[must_use]
    pub fn releveled(text: &str) -> Self {
        let lower = text.to_ascii_lowercase();
        let level = if lower.contains("error:") {
            ReportLevel::Error
        } else if lower.contains("warning:") {
            ReportLevel::Warning
        } else {
            ReportLevel::Info
        };
        Self::new(level, text)
    }
}

/// Destination for rendered report lines.
pub trait ReportSink: Send + Sync {
    /// Write one line.
    fn write(&self, line: &ReportLine);
}

/// Display ordering of a finished task: failures first, then warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Counted as a failure.
    Failed,
    /// Passed, but raised warnings.
    Warned,
    /// Passed or skipped without warnings.
    Clean,
}

/// Snapshot of a finished task, captured when its record is finalized.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// Task name.
    pub name: String,
    /// Final outcome.
    pub result: TaskResult,
    /// Why the scheduler ended the task, if it did.
    pub reason: Option<String>,
    /// Collaborator fault behind the outcome, if any.
    pub fault: Option<TaskFault>,
    /// Task-provided summary text.
    pub summary: String,
    /// Warnings raised by the task.
    pub warnings: Vec<String>,
    /// Errors raised by the task.
    pub errors: Vec<String>,
    /// How to reproduce the task locally.
    pub run_locally: String,
    /// In-place restarts.
    pub retries: u32,
    /// Wait between first readiness check and start, in milliseconds.
    pub wait_ms: u64,
    /// Start duration in milliseconds.
    pub setup_ms: u64,
    /// Test duration in milliseconds.
    pub test_ms: u64,
}

impl TaskReport {
    /// Capture a report from a record whose outcome is decided.
    #[must_use]
    pub fn capture(record: &ExecutionRecord, invoker: &str) -> Self {
        let task = record.task();
        let name = task.name();
        Self {
            name: name.to_string(),
            result: record.final_result().unwrap_or(TaskResult::Failed),
            reason: record.cancellation_reason().map(str::to_string),
            fault: record.fault().cloned(),
            summary: guarded_or(name, "summary", String::new(), || task.summary()),
            warnings: guarded_or(name, "warnings", Vec::new(), || task.warnings()),
            errors: guarded_or(name, "errors", Vec::new(), || task.errors()),
            run_locally: guarded_or(name, "run_locally_hint", String::new(), || {
                task.run_locally_hint(invoker)
            }),
            retries: record.retries(),
            wait_ms: as_millis_u64(record.wait_duration()),
            setup_ms: as_millis_u64(record.setup_duration()),
            test_ms: as_millis_u64(record.test_duration()),
        }
    }

    /// Whether the task passed but raised warnings.
    #[must_use]
    pub fn passed_with_warnings(&self) -> bool {
        self.result == TaskResult::Passed && !self.warnings.is_empty()
    }

    /// Display severity.
    #[must_use]
    pub fn severity(&self) -> Severity {
        if self.result.is_failure() {
            Severity::Failed
        } else if self.passed_with_warnings() {
            Severity::Warned
        } else {
            Severity::Clean
        }
    }

    fn headline(&self) -> String {
        if self.passed_with_warnings() {
            format!("{}: {} with warnings", self.name, self.result)
        } else {
            format!("{}: {}", self.name, self.result)
        }
    }

    fn headline_level(&self) -> ReportLevel {
        match self.severity() {
            Severity::Failed => ReportLevel::Error,
            Severity::Warned => ReportLevel::Warning,
            Severity::Clean => ReportLevel::Info,
        }
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    /// Zero-based pass index.
    pub pass_index: u32,
    /// Total passes requested.
    pub total_passes: u32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the pass was cut short by cancellation.
    pub cancelled: bool,
    /// Tasks that passed without warnings.
    pub passed: usize,
    /// Tasks that passed with warnings.
    pub passed_with_warnings: usize,
    /// Tasks that failed, timed out or were cancelled.
    pub failed: usize,
    /// Tasks that skipped themselves.
    pub skipped: usize,
    /// Per-task reports in completion order.
    pub tasks: Vec<TaskReport>,
}

impl PassSummary {
    /// Build a summary and its counts from finished task reports.
    #[must_use]
    pub fn new(
        pass_index: u32,
        total_passes: u32,
        duration: Duration,
        cancelled: bool,
        tasks: Vec<TaskReport>,
    ) -> Self {
        let mut summary = Self {
            pass_index,
            total_passes,
            duration_ms: as_millis_u64(duration),
            cancelled,
            passed: 0,
            passed_with_warnings: 0,
            failed: 0,
            skipped: 0,
            tasks,
        };
        for task in &summary.tasks {
            match (task.severity(), task.result) {
                (Severity::Failed, _) => summary.failed += 1,
                (Severity::Warned, _) => summary.passed_with_warnings += 1,
                (Severity::Clean, TaskResult::Skipped) => summary.skipped += 1,
                (Severity::Clean, _) => summary.passed += 1,
            }
        }
        summary
    }

    /// Whether any task in the pass failed.
    #[must_use]
    pub const fn had_failure(&self) -> bool {
        self.failed > 0
    }

    /// Task reports sorted failed, then warned, then clean.
    #[must_use]
    pub fn sorted_tasks(&self) -> Vec<&TaskReport> {
        let mut tasks: Vec<&TaskReport> = self.tasks.iter().collect();
        tasks.sort_by_key(|t| t.severity());
        tasks
    }
}

/// Cross-pass totals for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskTally {
    /// Task name.
    pub name: String,
    /// Passes without warnings.
    pub passed: u32,
    /// Passes with warnings.
    pub passed_with_warnings: u32,
    /// Failures.
    pub failed: u32,
    /// Skips.
    pub skipped: u32,
}

/// Cross-pass tallies, in first-seen task order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunTallies {
    /// Per-task totals.
    pub tasks: Vec<TaskTally>,
}

impl RunTallies {
    /// Tallies with a zeroed row per task name.
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            tasks: names
                .into_iter()
                .map(|name| TaskTally {
                    name: name.to_string(),
                    ..TaskTally::default()
                })
                .collect(),
        }
    }

    /// Add one pass's outcomes.
    pub fn absorb(&mut self, pass: &PassSummary) {
        for report in &pass.tasks {
            let position = self.tasks.iter().position(|t| t.name == report.name);
            let tally = if let Some(i) = position {
                &mut self.tasks[i]
            } else {
                self.tasks.push(TaskTally {
                    name: report.name.clone(),
                    ..TaskTally::default()
                });
                let last = self.tasks.len() - 1;
                &mut self.tasks[last]
            };
            match (report.severity(), report.result) {
                (Severity::Failed, _) => tally.failed += 1,
                (Severity::Warned, _) => tally.passed_with_warnings += 1,
                (Severity::Clean, TaskResult::Skipped) => tally.skipped += 1,
                (Severity::Clean, _) => tally.passed += 1,
            }
        }
    }

    /// Sum over all tasks.
    #[must_use]
    pub fn overall(&self) -> TaskTally {
        self.tasks.iter().fold(
            TaskTally {
                name: "overall".into(),
                ..TaskTally::default()
            },
            |mut acc, t| {
                acc.passed += t.passed;
                acc.passed_with_warnings += t.passed_with_warnings;
                acc.failed += t.failed;
                acc.skipped += t.skipped;
                acc
            },
        )
    }
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// Passes that actually ran.
    pub passes: Vec<PassSummary>,
    /// Cross-pass tallies.
    pub tallies: RunTallies,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// True iff no task failed in any pass and the run was not cancelled.
    pub success: bool,
}

impl RunReport {
    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Render the detailed report of one task.
#[must_use]
pub fn render_task(report: &TaskReport, replay_diagnostics: bool) -> Vec<ReportLine> {
    let mut lines = vec![
        ReportLine::info("=".repeat(60)),
        ReportLine::new(report.headline_level(), report.headline()),
    ];
    if let Some(reason) = &report.reason {
        lines.push(ReportLine::new(report.headline_level(), format!("Reason: {reason}")));
    }
    if let Some(fault) = &report.fault {
        lines.push(ReportLine::new(ReportLevel::Error, format!("Fault: {fault}")));
    }
    let mut timing = format!(
        "Wait {}, setup {}, test {}",
        format_duration(Duration::from_millis(report.wait_ms)),
        format_duration(Duration::from_millis(report.setup_ms)),
        format_duration(Duration::from_millis(report.test_ms)),
    );
    if report.retries > 0 {
        let _ = write!(timing, ", {} retries", report.retries);
    }
    lines.push(ReportLine::info(timing));

    lines.extend(report.summary.lines().map(ReportLine::releveled));

    if replay_diagnostics {
        if !report.errors.is_empty() {
            lines.push(ReportLine::new(ReportLevel::Error, format!("{} errors:", report.errors.len())));
            lines.extend(report.errors.iter().map(|e| ReportLine::new(ReportLevel::Error, format!("  {e}"))));
        }
        if !report.warnings.is_empty() {
            lines.push(ReportLine::new(ReportLevel::Warning, format!("{} warnings:", report.warnings.len())));
            lines.extend(report.warnings.iter().map(|w| ReportLine::new(ReportLevel::Warning, format!("  {w}"))));
        }
    }
    if !report.run_locally.is_empty() {
        lines.push(ReportLine::info(format!("Run locally: {}", report.run_locally)));
    }
    lines
}

/// Render the summary of one pass: counts, then one line per task by severity.
#[must_use]
pub fn render_pass(summary: &PassSummary) -> Vec<ReportLine> {
    let level = if summary.had_failure() || summary.cancelled {
        ReportLevel::Error
    } else if summary.passed_with_warnings > 0 {
        ReportLevel::Warning
    } else {
        ReportLevel::Info
    };
    let mut header = format!(
        "Pass {}/{} finished in {}: {} passed, {} passed with warnings, {} failed, {} skipped",
        summary.pass_index + 1,
        summary.total_passes,
        format_duration(Duration::from_millis(summary.duration_ms)),
        summary.passed,
        summary.passed_with_warnings,
        summary.failed,
        summary.skipped,
    );
    if summary.cancelled {
        header.push_str(" (cancelled)");
    }
    let mut lines = vec![ReportLine::new(level, header)];
    for task in summary.sorted_tasks() {
        let mut line = format!(
            "  {:<10} {} ({})",
            task_label(task),
            task.name,
            format_duration(Duration::from_millis(task.test_ms))
        );
        if let Some(reason) = &task.reason {
            let _ = write!(line, " - {reason}");
        }
        lines.push(ReportLine::new(task.headline_level(), line));
    }
    lines
}

/// Render cross-pass totals.
#[must_use]
pub fn render_run(tallies: &RunTallies, passes: usize) -> Vec<ReportLine> {
    let mut lines = vec![ReportLine::info(format!("Results across {passes} passes:"))];
    let mut rows: Vec<&TaskTally> = tallies.tasks.iter().collect();
    rows.sort_by(|a, b| match b.failed.cmp(&a.failed) {
        Ordering::Equal => b.passed_with_warnings.cmp(&a.passed_with_warnings),
        other => other,
    });
    for tally in rows {
        let level = if tally.failed > 0 {
            ReportLevel::Error
        } else if tally.passed_with_warnings > 0 {
            ReportLevel::Warning
        } else {
            ReportLevel::Info
        };
        lines.push(ReportLine::new(level, format!("  {}: {}", tally.name, tally_counts(tally))));
    }
    let overall = tallies.overall();
    let level = if overall.failed > 0 { ReportLevel::Error } else { ReportLevel::Info };
    lines.push(ReportLine::new(level, format!("Overall: {}", tally_counts(&overall))));
    lines
}

fn tally_counts(t: &TaskTally) -> String {
    format!(
        "{} passed, {} passed with warnings, {} failed, {} skipped",
        t.passed, t.passed_with_warnings, t.failed, t.skipped
    )
}

fn task_label(task: &TaskReport) -> String {
    if task.passed_with_warnings() {
        "Warnings".into()
    } else {
        task.result.to_string()
    }
}

/// Emits reports to a sink, streaming or batching task reports.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn ReportSink>,
    defer: bool,
    replay_diagnostics: bool,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("defer", &self.defer)
            .field("replay_diagnostics", &self.replay_diagnostics)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    /// Create a reporter.
    pub fn new(sink: Arc<dyn ReportSink>, defer: bool, replay_diagnostics: bool) -> Self {
        Self {
            sink,
            defer,
            replay_diagnostics,
        }
    }

    /// A task finished: stream its report unless reports are deferred.
    pub fn task_finished(&self, report: &TaskReport) {
        if !self.defer {
            self.emit(render_task(report, self.replay_diagnostics));
        }
    }

    /// A pass finished: emit deferred task reports (by severity), then the summary.
    pub fn pass_finished(&self, summary: &PassSummary) {
        if self.defer {
            for task in summary.sorted_tasks() {
                self.emit(render_task(task, self.replay_diagnostics));
            }
        }
        self.emit(render_pass(summary));
    }

    /// The run finished after more than one pass: emit cross-pass totals.
    pub fn run_finished(&self, tallies: &RunTallies, passes: usize) {
        self.emit(render_run(tallies, passes));
    }

    fn emit(&self, lines: Vec<ReportLine>) {
        for line in &lines {
            self.sink.write(line);
        }
    }
}
