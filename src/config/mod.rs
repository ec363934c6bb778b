//! Configuration models for test runs.

pub mod options;

pub use options::{RunOptions, ENV_PREFIX};
