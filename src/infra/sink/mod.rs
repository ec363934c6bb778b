//! Report sink backends.

pub mod memory;
pub mod tracing_sink;

pub use memory::MemoryReportSink;
pub use tracing_sink::TracingReportSink;
