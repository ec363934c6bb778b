//! Tests for run option loading and validation

use std::time::Duration;

use prometheus_test_scheduler::config::RunOptions;

#[test]
fn test_defaults_match_documented_values() {
    let options = RunOptions::default();
    assert_eq!(options.iterations, 1);
    assert_eq!(options.parallel, 1);
    assert_eq!(options.wait(), Duration::from_secs(300));
    assert_eq!(options.tick_interval(), Duration::from_millis(500));
    assert_eq!(options.readiness_cooldown(), Duration::from_secs(30));
    assert_eq!(options.pass_cooldown(), Duration::from_secs(5));
    assert_eq!(options.grace_period(), Duration::from_secs(10));
    assert_eq!(options.status_interval(), Duration::from_secs(60));
    assert_eq!(options.invoker, "RunTests");
    assert!(options.defer_reports);
}

#[test]
fn test_validation_rejects_zero_values() {
    assert!(RunOptions::new().with_iterations(0).validate().is_err());
    assert!(RunOptions::new().with_parallel(0).validate().is_err());
    assert!(RunOptions::new().with_wait_secs(0).validate().is_err());
    assert!(RunOptions::new()
        .with_tick_interval(Duration::ZERO)
        .validate()
        .is_err());
}

#[test]
fn test_from_json_str_fills_defaults() {
    let options = RunOptions::from_json_str(r#"{"iterations": 5, "parallel": 3, "no_timeout": true}"#).unwrap();
    assert_eq!(options.iterations, 5);
    assert_eq!(options.parallel, 3);
    assert!(options.no_timeout);
    assert_eq!(options.wait_secs, 300);
}

#[test]
fn test_from_json_str_errors() {
    let err = RunOptions::from_json_str("{not json").unwrap_err();
    assert!(err.starts_with("parse error"));
    let err = RunOptions::from_json_str(r#"{"parallel": 0}"#).unwrap_err();
    assert!(err.contains("parallel"));
}

#[test]
fn test_json_round_trip_keeps_builder_values() {
    let options = RunOptions::new()
        .with_stop_on_error(true)
        .with_grace_period(Duration::from_millis(1500))
        .with_invoker("ci-runner");
    let json = serde_json::to_string(&options).unwrap();
    assert_eq!(RunOptions::from_json_str(&json).unwrap(), options);
}
