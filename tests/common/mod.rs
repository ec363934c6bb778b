//! Scriptable task shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use prometheus_test_scheduler::builders::RunBuilder;
use prometheus_test_scheduler::config::RunOptions;
use prometheus_test_scheduler::core::{
    AbortRegistry, AppResult, InMemoryAuditSink, MaxDurationPolicy, PassController, StartContext,
    StopReason, Task, TaskResult, TaskStatus,
};
use prometheus_test_scheduler::infra::MemoryReportSink;

/// Tracks how many tasks hold a resource at once.
#[derive(Debug, Default)]
pub struct Gauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub enum Readiness {
    Ready,
    Never,
    Broken,
    /// Claims the shared device when it is free; cleanup releases it.
    Device(Arc<AtomicBool>),
}

#[derive(Debug, Clone)]
pub enum StartBehavior {
    Succeed,
    Refuse,
    Fail,
    /// Sleep without looking at the cancel token, then succeed.
    Hang(Duration),
    /// Wait on the cancel token for at most the given time, then succeed.
    UntilCancelled(Duration),
}

#[derive(Debug, Clone)]
pub enum Completion {
    AfterTicks(u32),
    After(Duration),
    Never,
    /// `status` panics.
    Panic,
}

#[derive(Debug, Default)]
pub struct Calls {
    pub readiness_checks: u32,
    pub starts: u32,
    pub ticks: u32,
    pub stops: Vec<StopReason>,
    pub restarts: u32,
    pub cleanups: u32,
    pub persisted: Option<TaskResult>,
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct Progress {
    ticks: u32,
    started_at: Option<Instant>,
    retries_left: u32,
}

pub struct MockTask {
    name: String,
    priority: i32,
    max_duration: Duration,
    policy: MaxDurationPolicy,
    readiness: Readiness,
    start: StartBehavior,
    completion: Completion,
    result: TaskResult,
    retries: u32,
    restart_ok: bool,
    warnings: Vec<String>,
    gauge: Option<Arc<Gauge>>,
    progress: Mutex<Progress>,
    pub calls: Mutex<Calls>,
}

impl MockTask {
    /// Ready immediately, passes on its first tick.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            priority: 0,
            max_duration: Duration::from_secs(60),
            policy: MaxDurationPolicy::Failure,
            readiness: Readiness::Ready,
            start: StartBehavior::Succeed,
            completion: Completion::AfterTicks(1),
            result: TaskResult::Passed,
            retries: 0,
            restart_ok: true,
            warnings: Vec::new(),
            gauge: None,
            progress: Mutex::new(Progress::default()),
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_duration(mut self, max: Duration, policy: MaxDurationPolicy) -> Self {
        self.max_duration = max;
        self.policy = policy;
        self
    }

    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_start(mut self, start: StartBehavior) -> Self {
        self.start = start;
        self
    }

    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    pub fn with_result(mut self, result: TaskResult) -> Self {
        self.result = result;
        self
    }

    pub fn with_retries(mut self, retries: u32, restart_ok: bool) -> Self {
        self.retries = retries;
        self.restart_ok = restart_ok;
        self
    }

    pub fn with_warnings(mut self, warnings: &[&str]) -> Self {
        self.warnings = warnings.iter().map(|w| (*w).to_string()).collect();
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn starts(&self) -> u32 {
        self.calls.lock().starts
    }

    pub fn cleanups(&self) -> u32 {
        self.calls.lock().cleanups
    }

    fn device(&self) -> Option<&AtomicBool> {
        match &self.readiness {
            Readiness::Device(flag) => Some(flag),
            _ => None,
        }
    }
}

impl Task for MockTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn max_duration(&self) -> Duration {
        self.max_duration
    }

    fn max_duration_policy(&self) -> MaxDurationPolicy {
        self.policy
    }

    fn is_ready_to_start(&self) -> AppResult<bool> {
        self.calls.lock().readiness_checks += 1;
        match &self.readiness {
            Readiness::Ready => Ok(true),
            Readiness::Never => Ok(false),
            Readiness::Broken => anyhow::bail!("device inventory unavailable"),
            Readiness::Device(in_use) => Ok(in_use
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()),
        }
    }

    fn start(&self, ctx: &StartContext) -> AppResult<bool> {
        self.calls.lock().starts += 1;
        if let Some(gauge) = &self.gauge {
            gauge.enter();
        }
        *self.progress.lock() = Progress {
            ticks: 0,
            started_at: Some(Instant::now()),
            retries_left: self.retries,
        };
        match &self.start {
            StartBehavior::Succeed => Ok(true),
            StartBehavior::Refuse => Ok(false),
            StartBehavior::Fail => anyhow::bail!("could not flash build"),
            StartBehavior::Hang(duration) => {
                thread::sleep(*duration);
                Ok(true)
            }
            StartBehavior::UntilCancelled(duration) => {
                ctx.cancel.sleep(*duration);
                Ok(true)
            }
        }
    }

    fn tick(&self) -> AppResult<()> {
        self.calls.lock().ticks += 1;
        self.progress.lock().ticks += 1;
        Ok(())
    }

    fn status(&self) -> TaskStatus {
        let progress = self.progress.lock();
        let done = match &self.completion {
            Completion::AfterTicks(n) => progress.ticks >= *n,
            Completion::After(duration) => progress
                .started_at
                .is_some_and(|t| t.elapsed() >= *duration),
            Completion::Never => false,
            Completion::Panic => panic!("device handle vanished"),
        };
        if done {
            TaskStatus::Complete
        } else {
            TaskStatus::InProgress
        }
    }

    fn stop(&self, reason: StopReason) -> AppResult<()> {
        self.calls.lock().stops.push(reason);
        Ok(())
    }

    fn result(&self) -> TaskResult {
        if self.progress.lock().retries_left > 0 {
            TaskResult::WantRetry
        } else {
            self.result
        }
    }

    fn restart(&self) -> AppResult<bool> {
        self.calls.lock().restarts += 1;
        if !self.restart_ok {
            return Ok(false);
        }
        let mut progress = self.progress.lock();
        progress.retries_left = progress.retries_left.saturating_sub(1);
        progress.ticks = 0;
        Ok(true)
    }

    fn cleanup(&self) -> AppResult<()> {
        self.calls.lock().cleanups += 1;
        if let Some(gauge) = &self.gauge {
            gauge.leave();
        }
        if let Some(device) = self.device() {
            device.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn set_cancellation_reason(&self, reason: &str) {
        self.calls.lock().reason = Some(reason.to_string());
    }

    fn set_result(&self, result: TaskResult) {
        self.calls.lock().persisted = Some(result);
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
    }

    fn summary(&self) -> String {
        let mut summary = format!("{} ran {} ticks", self.name, self.calls.lock().ticks);
        for warning in &self.warnings {
            summary.push_str(&format!("\nWarning: {warning}"));
        }
        summary
    }

    fn run_locally_hint(&self, invoker: &str) -> String {
        format!("{invoker} -test={}", self.name)
    }
}

/// Options tuned for tests: fast ticks, short cool-downs.
pub fn fast_options() -> RunOptions {
    RunOptions::new()
        .with_tick_interval(Duration::from_millis(5))
        .with_readiness_cooldown(Duration::from_millis(20))
        .with_pass_cooldown(Duration::from_millis(10))
        .with_grace_period(Duration::from_millis(200))
}

/// A controller wired to in-memory sinks and a private abort registry.
pub struct Harness {
    pub controller: Arc<PassController>,
    pub report: Arc<MemoryReportSink>,
    pub audit: Arc<Mutex<InMemoryAuditSink>>,
    pub registry: Arc<AbortRegistry>,
}

pub fn harness(options: RunOptions) -> Harness {
    let report = Arc::new(MemoryReportSink::new());
    let audit = Arc::new(Mutex::new(InMemoryAuditSink::new(4096)));
    let registry = Arc::new(AbortRegistry::new());
    let controller = RunBuilder::new(options)
        .sink(Arc::clone(&report) as _)
        .audit(Arc::clone(&audit))
        .registry(Arc::clone(&registry))
        .build()
        .expect("valid options");
    Harness {
        controller: Arc::new(controller),
        report,
        audit,
        registry,
    }
}

pub fn as_tasks(tasks: &[Arc<MockTask>]) -> Vec<Arc<dyn Task>> {
    tasks.iter().map(|t| Arc::clone(t) as Arc<dyn Task>).collect()
}
