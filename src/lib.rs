//! # Prometheus Test Scheduler
//!
//! A multi-pass test-run scheduler for long-lived test tasks that compete for a
//! finite, externally managed resource pool (devices, GPUs, lab hardware).
//!
//! The scheduler runs every task once per pass under a parallelism limit. Tasks
//! are polled for readiness, started on short-lived worker threads, ticked on a
//! fixed interval until they finish, time out, ask for a retry or get cancelled,
//! and are finally rendered into per-task, per-pass and cross-pass reports.
//!
//! ## Key Features
//!
//! - **Resource-aware admission**: tasks are admitted one at a time, in
//!   priority order, only when they report ready and a concurrency slot is free
//! - **Resource-wait ceiling**: a task that cannot acquire resources while the
//!   scheduler is otherwise idle is failed after a configurable wait
//! - **Slow starts off the tick loop**: each admitted task starts on its own
//!   worker thread; stuck starts are abandoned, never killed
//! - **Per-task state machine**: timeouts with fail or pass policies, retries in
//!   place, idempotent finalization
//! - **Cooperative cancellation**: two-stage abort handlers with a bounded
//!   grace period before stragglers are force-finalized
//! - **Reporting**: streamed or deferred task reports, pass summaries sorted by
//!   severity and cross-pass tallies
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_test_scheduler::builders::RunBuilder;
//! use prometheus_test_scheduler::config::RunOptions;
//!
//! let controller = RunBuilder::new(
//!     RunOptions::new()
//!         .with_iterations(3)
//!         .with_parallel(4)
//!         .with_stop_on_error(true),
//! )
//! .build()?;
//!
//! let tasks: Vec<Arc<dyn Task>> = discover_tasks();
//! let report = controller.run(&tasks)?;
//! std::process::exit(if report.success { 0 } else { 1 });
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling: task capability surface, state machine, sweep and passes.
pub mod core;
/// Configuration models for test runs.
pub mod config;
/// Builders to construct controllers from configuration.
pub mod builders;
/// Infrastructure adapters for report output.
pub mod infra;
/// Runtime adapters (tokio) and signal wiring.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;
