//! Runtime adapters for async hosts.

pub mod tokio_runner;

pub use tokio_runner::{abort_on_ctrl_c, run_async};
