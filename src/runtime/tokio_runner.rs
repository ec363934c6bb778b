//! Tokio adapter: run a controller without blocking the async runtime.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::{AbortRegistry, PassController, RunReport, SchedulerError, Task};

/// Run `controller` over `tasks` on tokio's blocking pool.
///
/// The sweep loop sleeps and blocks on start workers, so it must never run on
/// an async worker thread.
///
/// # Errors
///
/// Errors from [`PassController::run`], or [`SchedulerError::Internal`] if the
/// blocking task panicked or was cancelled.
pub async fn run_async(
    controller: Arc<PassController>,
    tasks: Vec<Arc<dyn Task>>,
) -> Result<RunReport, SchedulerError> {
    tokio::task::spawn_blocking(move || controller.run(&tasks))
        .await
        .map_err(|e| SchedulerError::Internal(format!("run task failed: {e}")))?
}

/// Trigger `registry` on the first Ctrl-C.
///
/// Returns the listener task; abort it to stop listening.
pub fn abort_on_ctrl_c(registry: Arc<AbortRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, aborting test run");
                registry.trigger();
            }
            Err(e) => warn!(error = %e, "could not listen for ctrl-c"),
        }
    })
}
