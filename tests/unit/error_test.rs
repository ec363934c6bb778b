//! Tests for error types

use std::time::Duration;

use prometheus_test_scheduler::core::{SchedulerError, TaskFault};

#[test]
fn test_scheduler_error_messages() {
    assert_eq!(SchedulerError::NoTasks.to_string(), "no tasks to run");
    assert_eq!(
        SchedulerError::InvalidOptions("parallel must be at least 1".into()).to_string(),
        "invalid options: parallel must be at least 1"
    );
}

#[test]
fn test_task_fault_display() {
    assert_eq!(TaskFault::StartRefused.to_string(), "task refused to start");
    assert!(TaskFault::ResourceStarvation(Duration::from_secs(300))
        .to_string()
        .starts_with("could not acquire resources"));
}

#[test]
fn test_task_fault_serializes_with_kind_tag() {
    let json = serde_json::to_value(TaskFault::Tick("socket closed".into())).unwrap();
    assert_eq!(json["kind"], "tick");
    assert_eq!(json["detail"], "socket closed");
    let json = serde_json::to_value(TaskFault::Abandoned).unwrap();
    assert_eq!(json["kind"], "abandoned");
}
