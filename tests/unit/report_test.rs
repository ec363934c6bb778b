//! Tests for report rendering and the reporter

use std::sync::Arc;
use std::time::Duration;

use prometheus_test_scheduler::core::report::{render_pass, render_run, render_task};
use prometheus_test_scheduler::core::{
    PassSummary, ReportLevel, Reporter, RunTallies, TaskFault, TaskReport, TaskResult,
};
use prometheus_test_scheduler::infra::MemoryReportSink;

fn task(name: &str, result: TaskResult) -> TaskReport {
    TaskReport {
        name: name.into(),
        result,
        reason: None,
        fault: None,
        summary: format!("{name} summary"),
        warnings: Vec::new(),
        errors: Vec::new(),
        run_locally: format!("RunTests -test={name}"),
        retries: 0,
        wait_ms: 0,
        setup_ms: 1200,
        test_ms: 65_000,
    }
}

fn pass(tasks: Vec<TaskReport>) -> PassSummary {
    PassSummary::new(0, 2, Duration::from_secs(90), false, tasks)
}

#[test]
fn test_pass_render_lists_failures_first() {
    let mut starved = task("gpu_soak", TaskResult::Failed);
    starved.reason = Some("gpu_soak could not acquire resources within 5m 00s".into());
    starved.fault = Some(TaskFault::ResourceStarvation(Duration::from_secs(300)));
    let summary = pass(vec![task("boot", TaskResult::Passed), starved]);

    let lines = render_pass(&summary);

    assert_eq!(lines[0].level, ReportLevel::Error);
    assert!(lines[0].text.starts_with("Pass 1/2 finished in 1m 30s: 1 passed"));
    assert!(lines[1].text.contains("gpu_soak"));
    assert!(lines[1].text.contains("could not acquire resources"));
    assert!(lines[2].text.contains("boot"));
}

#[test]
fn test_task_render_shows_retries_in_timing_line() {
    let mut flaky = task("flaky", TaskResult::Passed);
    flaky.retries = 2;

    let lines = render_task(&flaky, false);

    let timing = lines.iter().find(|l| l.text.starts_with("Wait ")).unwrap();
    assert!(timing.text.ends_with(", 2 retries"));
    let clean = render_task(&task("boot", TaskResult::Passed), false);
    assert!(!clean.iter().any(|l| l.text.contains("retries")));
}

#[test]
fn test_cancelled_pass_is_marked() {
    let summary = PassSummary::new(0, 1, Duration::ZERO, true, vec![task("a", TaskResult::Cancelled)]);
    assert!(render_pass(&summary)[0].text.ends_with("(cancelled)"));
}

#[test]
fn test_deferred_reports_are_emitted_at_pass_end() {
    let sink = Arc::new(MemoryReportSink::new());
    let reporter = Reporter::new(Arc::clone(&sink) as _, true, false);
    let report = task("boot", TaskResult::Passed);

    reporter.task_finished(&report);
    assert!(sink.lines().is_empty());

    reporter.pass_finished(&pass(vec![report]));
    assert!(sink.contains("boot: Passed"));
    assert!(sink.contains("Run locally: RunTests -test=boot"));
    assert!(sink.contains("Pass 1/2 finished"));
}

#[test]
fn test_streamed_reports_replay_diagnostics() {
    let sink = Arc::new(MemoryReportSink::new());
    let reporter = Reporter::new(Arc::clone(&sink) as _, false, true);
    let mut report = task("render", TaskResult::Failed);
    report.errors = vec!["shader compile failed".into()];

    reporter.task_finished(&report);

    assert!(sink.contains("render: Failed"));
    assert!(sink.contains("1 errors:"));
    assert!(sink.contains("  shader compile failed"));
    assert!(sink.count_at(ReportLevel::Error) >= 3);
}

#[test]
fn test_run_render_orders_by_failures() {
    let mut tallies = RunTallies::new(["steady", "flaky"]);
    tallies.absorb(&pass(vec![task("steady", TaskResult::Passed), task("flaky", TaskResult::Failed)]));
    tallies.absorb(&pass(vec![task("steady", TaskResult::Passed), task("flaky", TaskResult::Passed)]));

    let lines = render_run(&tallies, 2);

    assert_eq!(lines[0].text, "Results across 2 passes:");
    assert!(lines[1].text.starts_with("  flaky: 1 passed"));
    assert_eq!(lines[1].level, ReportLevel::Error);
    assert!(lines[2].text.starts_with("  steady: 2 passed"));
    assert_eq!(
        lines[3].text,
        "Overall: 3 passed, 0 passed with warnings, 1 failed, 0 skipped"
    );
}
