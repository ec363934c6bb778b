//! Infrastructure adapters for report output.

pub mod sink;

pub use sink::{MemoryReportSink, TracingReportSink};
