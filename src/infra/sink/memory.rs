//! In-memory report sink, for tests and embedding hosts.

use parking_lot::Mutex;

use crate::core::{ReportLevel, ReportLine, ReportSink};

/// Captures rendered report lines in order.
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    lines: Mutex<Vec<ReportLine>>,
}

impl MemoryReportSink {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of captured lines.
    #[must_use]
    pub fn lines(&self) -> Vec<ReportLine> {
        self.lines.lock().clone()
    }

    /// Captured line texts.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.lines.lock().iter().map(|l| l.text.clone()).collect()
    }

    /// Whether any captured line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.text.contains(needle))
    }

    /// Number of captured lines at `level`.
    #[must_use]
    pub fn count_at(&self, level: ReportLevel) -> usize {
        self.lines.lock().iter().filter(|l| l.level == level).count()
    }
}

impl ReportSink for MemoryReportSink {
    fn write(&self, line: &ReportLine) {
        self.lines.lock().push(line.clone());
    }
}
