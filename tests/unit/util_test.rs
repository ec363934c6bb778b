//! Tests for utility helpers

use std::time::Duration;

use prometheus_test_scheduler::util::{as_millis_u64, format_duration, init_tracing};

#[test]
fn test_as_millis_saturates() {
    assert_eq!(as_millis_u64(Duration::from_millis(1234)), 1234);
    assert_eq!(as_millis_u64(Duration::MAX), u64::MAX);
}

#[test]
fn test_format_duration_boundaries() {
    assert_eq!(format_duration(Duration::ZERO), "0ms");
    assert_eq!(format_duration(Duration::from_secs(59)), "59.0s");
    assert_eq!(format_duration(Duration::from_secs(60)), "1m 00s");
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
