//! Builders that assemble controllers from configuration.

pub mod run_builder;

pub use run_builder::RunBuilder;
