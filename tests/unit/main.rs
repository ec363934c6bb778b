//! Unit tests for individual components

mod cancel_test;
mod config_test;
mod error_test;
mod report_test;
mod util_test;
