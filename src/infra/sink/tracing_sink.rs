//! Report sink that forwards every line to `tracing`.

use tracing::{error, info, warn};

use crate::core::{ReportLevel, ReportLine, ReportSink};

/// Emits each report line as a `tracing` event under the `test_report` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReportSink;

impl ReportSink for TracingReportSink {
    fn write(&self, line: &ReportLine) {
        match line.level {
            ReportLevel::Info => info!(target: "test_report", "{}", line.text),
            ReportLevel::Warning => warn!(target: "test_report", "{}", line.text),
            ReportLevel::Error => error!(target: "test_report", "{}", line.text),
        }
    }
}
