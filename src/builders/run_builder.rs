//! Builder to construct a pass controller from run options.

use std::sync::Arc;

use crate::config::RunOptions;
use crate::core::{AbortRegistry, AuditSink, PassController, ReportSink, Reporter, SchedulerError};
use crate::infra::TracingReportSink;

/// Assembles a [`PassController`].
///
/// Defaults: reports go to [`TracingReportSink`], abort handlers register with
/// [`AbortRegistry::global`], no audit trail.
pub struct RunBuilder {
    options: RunOptions,
    sink: Option<Arc<dyn ReportSink>>,
    audit: Option<Box<dyn AuditSink>>,
    registry: Option<Arc<AbortRegistry>>,
}

impl std::fmt::Debug for RunBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunBuilder")
            .field("options", &self.options)
            .field("sink", &self.sink.is_some())
            .field("audit", &self.audit.is_some())
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

impl RunBuilder {
    /// Start from `options`.
    #[must_use]
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            sink: None,
            audit: None,
            registry: None,
        }
    }

    /// Send rendered reports to `sink`.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Record scheduling transitions into `audit`.
    #[must_use]
    pub fn audit(mut self, audit: impl AuditSink + 'static) -> Self {
        self.audit = Some(Box::new(audit));
        self
    }

    /// Register abort handlers with `registry` instead of the global one.
    #[must_use]
    pub fn registry(mut self, registry: Arc<AbortRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate the options and build the controller.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidOptions`] if validation fails.
    pub fn build(self) -> Result<PassController, SchedulerError> {
        self.options
            .validate()
            .map_err(SchedulerError::InvalidOptions)?;
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingReportSink));
        let reporter = Reporter::new(
            sink,
            self.options.defer_reports,
            self.options.replay_diagnostics,
        );
        let registry = self.registry.unwrap_or_else(AbortRegistry::global);
        Ok(PassController::new(self.options, registry, self.audit, reporter))
    }
}
