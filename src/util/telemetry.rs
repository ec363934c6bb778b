//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: scheduler events and report lines at
/// info, everything else at warn.
pub const DEFAULT_FILTER: &str = "warn,prometheus_test_scheduler=info,test_report=info";

/// Install a default `fmt` subscriber unless one is already set.
///
/// `RUST_LOG` takes precedence over [`DEFAULT_FILTER`]. Hosts that configure
/// their own subscriber can skip this entirely.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
