//! Run options recognized by the scheduler.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix of environment variables read by [`RunOptions::from_env`].
pub const ENV_PREFIX: &str = "TESTRUN_";

/// Options controlling a test run.
///
/// Durations are stored as integers so the struct round-trips through JSON and
/// environment variables; use the accessor methods to get [`Duration`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Number of passes over the task set.
    pub iterations: u32,
    /// Stop after the first pass that had a failure.
    pub stop_on_error: bool,
    /// Ignore task max durations.
    pub no_timeout: bool,
    /// Resource-wait ceiling in seconds.
    pub wait_secs: u64,
    /// Maximum number of starting plus running tasks.
    pub parallel: usize,
    /// Batch detailed task reports at pass end instead of streaming them.
    pub defer_reports: bool,
    /// Replay each task's explicit error and warning lists in its report.
    pub replay_diagnostics: bool,
    /// Invoker passed to each task's run-locally hint.
    pub invoker: String,
    /// Scheduler tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Minimum delay between fruitless readiness checks in milliseconds.
    pub readiness_cooldown_ms: u64,
    /// Delay before every pass after the first, in milliseconds.
    pub pass_cooldown_ms: u64,
    /// Bound on the wait for cancellation acknowledgement, in milliseconds.
    pub grace_period_ms: u64,
    /// Interval between status lines in seconds.
    pub status_interval_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            iterations: 1,
            stop_on_error: false,
            no_timeout: false,
            wait_secs: 300,
            parallel: 1,
            defer_reports: true,
            replay_diagnostics: false,
            invoker: "RunTests".into(),
            tick_interval_ms: 500,
            readiness_cooldown_ms: 30_000,
            pass_cooldown_ms: 5_000,
            grace_period_ms: 10_000,
            status_interval_secs: 60,
        }
    }
}

impl RunOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of passes.
    #[must_use]
    pub const fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set stop-on-error.
    #[must_use]
    pub const fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    /// Disable task timeouts.
    #[must_use]
    pub const fn with_no_timeout(mut self, no_timeout: bool) -> Self {
        self.no_timeout = no_timeout;
        self
    }

    /// Set the resource-wait ceiling in seconds.
    #[must_use]
    pub const fn with_wait_secs(mut self, wait_secs: u64) -> Self {
        self.wait_secs = wait_secs;
        self
    }

    /// Set the parallelism limit.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set whether task reports are deferred to pass end.
    #[must_use]
    pub const fn with_defer_reports(mut self, defer_reports: bool) -> Self {
        self.defer_reports = defer_reports;
        self
    }

    /// Set whether error and warning lists are replayed in task reports.
    #[must_use]
    pub const fn with_replay_diagnostics(mut self, replay: bool) -> Self {
        self.replay_diagnostics = replay;
        self
    }

    /// Set the invoker used in run-locally hints.
    #[must_use]
    pub fn with_invoker(mut self, invoker: impl Into<String>) -> Self {
        self.invoker = invoker.into();
        self
    }

    /// Set the tick interval.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = duration_ms(interval);
        self
    }

    /// Set the readiness cool-down.
    #[must_use]
    pub fn with_readiness_cooldown(mut self, cooldown: Duration) -> Self {
        self.readiness_cooldown_ms = duration_ms(cooldown);
        self
    }

    /// Set the cool-down between passes.
    #[must_use]
    pub fn with_pass_cooldown(mut self, cooldown: Duration) -> Self {
        self.pass_cooldown_ms = duration_ms(cooldown);
        self
    }

    /// Set the cancellation grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = duration_ms(grace);
        self
    }

    /// Set the status line interval in seconds.
    #[must_use]
    pub const fn with_status_interval_secs(mut self, secs: u64) -> Self {
        self.status_interval_secs = secs;
        self
    }

    /// Resource-wait ceiling.
    #[must_use]
    pub const fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    /// Tick interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Readiness cool-down.
    #[must_use]
    pub const fn readiness_cooldown(&self) -> Duration {
        Duration::from_millis(self.readiness_cooldown_ms)
    }

    /// Cool-down between passes.
    #[must_use]
    pub const fn pass_cooldown(&self) -> Duration {
        Duration::from_millis(self.pass_cooldown_ms)
    }

    /// Cancellation grace period.
    #[must_use]
    pub const fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Status line interval.
    #[must_use]
    pub const fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    /// Validate option values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.iterations == 0 {
            return Err("iterations must be at least 1".into());
        }
        if self.parallel == 0 {
            return Err("parallel must be at least 1".into());
        }
        if self.wait_secs == 0 {
            return Err("wait_secs must be greater than 0".into());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse options from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let options: Self =
            serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        options.validate()?;
        Ok(options)
    }

    /// Build options from `TESTRUN_*` environment variables, loading a `.env`
    /// file first if one exists. Unset variables keep their defaults.
    ///
    /// `TESTRUN_PARALLEL=auto` uses the number of logical CPUs.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or a
    /// validation error.
    pub fn from_env() -> Result<Self, String> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build options from an arbitrary key lookup (keys include the prefix).
    ///
    /// # Errors
    ///
    /// See [`RunOptions::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut options = Self::default();

        if let Some(v) = get("ITERATIONS") {
            options.iterations = parse_var("ITERATIONS", &v)?;
        }
        if let Some(v) = get("STOP_ON_ERROR") {
            options.stop_on_error = parse_flag("STOP_ON_ERROR", &v)?;
        }
        if let Some(v) = get("NO_TIMEOUT") {
            options.no_timeout = parse_flag("NO_TIMEOUT", &v)?;
        }
        if let Some(v) = get("WAIT") {
            options.wait_secs = parse_var("WAIT", &v)?;
        }
        if let Some(v) = get("PARALLEL") {
            options.parallel = if v.eq_ignore_ascii_case("auto") {
                num_cpus::get()
            } else {
                parse_var("PARALLEL", &v)?
            };
        }
        if let Some(v) = get("DEFER_REPORTS") {
            options.defer_reports = parse_flag("DEFER_REPORTS", &v)?;
        }
        if let Some(v) = get("REPLAY_DIAGNOSTICS") {
            options.replay_diagnostics = parse_flag("REPLAY_DIAGNOSTICS", &v)?;
        }
        if let Some(v) = get("INVOKER") {
            options.invoker = v;
        }
        if let Some(v) = get("TICK_INTERVAL_MS") {
            options.tick_interval_ms = parse_var("TICK_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("READINESS_COOLDOWN_MS") {
            options.readiness_cooldown_ms = parse_var("READINESS_COOLDOWN_MS", &v)?;
        }
        if let Some(v) = get("PASS_COOLDOWN_MS") {
            options.pass_cooldown_ms = parse_var("PASS_COOLDOWN_MS", &v)?;
        }
        if let Some(v) = get("GRACE_PERIOD_MS") {
            options.grace_period_ms = parse_var("GRACE_PERIOD_MS", &v)?;
        }
        if let Some(v) = get("STATUS_INTERVAL_SECS") {
            options.status_interval_secs = parse_var("STATUS_INTERVAL_SECS", &v)?;
        }

        options.validate()?;
        Ok(options)
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{name}={value:?}: {e}"))
}

fn parse_flag(name: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!("{ENV_PREFIX}{name}={value:?}: expected a boolean")),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
