//! Cooperative cancellation: the shared abort flag and process-wide abort handlers.
//!
//! Cancellation is two-stage. [`AbortRegistry::trigger`] first runs every
//! abort handler (which flips the cancellation flag of each active run) and
//! then every post-abort handler (which acknowledges the abort). A sweep that
//! observes the flag waits a bounded grace period for the acknowledgement
//! before force-finalizing whatever is still starting or running.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    acknowledged: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

/// Shared cancellation flag with a post-abort acknowledgement.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cancellation flag and wake every sleeper.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::AcqRel) {
            debug!("cancellation flag set");
        }
        self.notify();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Acknowledge the abort (second stage).
    pub fn acknowledge(&self) {
        self.state.acknowledged.store(true, Ordering::Release);
        self.notify();
    }

    /// Whether the abort has been acknowledged.
    #[must_use]
    pub fn is_acknowledged(&self) -> bool {
        self.state.acknowledged.load(Ordering::Acquire)
    }

    /// Sleep for `duration` or until cancelled. Returns `true` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        self.wait_until(duration, Self::is_cancelled)
    }

    /// Wait up to `timeout` for the acknowledgement. Returns `true` once acknowledged.
    pub fn wait_for_ack(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, Self::is_acknowledged)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock.lock();
        while !done(self) {
            if self.state.condvar.wait_until(&mut guard, deadline).timed_out() {
                return done(self);
            }
        }
        true
    }

    fn notify(&self) {
        let _guard = self.state.lock.lock();
        self.state.condvar.notify_all();
    }
}

type Handler = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Handlers {
    abort: Vec<(u64, Handler)>,
    post_abort: Vec<(u64, Handler)>,
}

/// Registry of abort and post-abort handlers.
///
/// A process normally uses [`AbortRegistry::global`]; tests inject their own.
#[derive(Default)]
pub struct AbortRegistry {
    handlers: Mutex<Handlers>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for AbortRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.lock();
        f.debug_struct("AbortRegistry")
            .field("abort_handlers", &handlers.abort.len())
            .field("post_abort_handlers", &handlers.post_abort.len())
            .finish()
    }
}

impl AbortRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<AbortRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Register a handler pair. Both are removed when the returned guard drops.
    pub fn register<A, P>(self: &Arc<Self>, abort: A, post_abort: P) -> AbortRegistration
    where
        A: Fn() + Send + Sync + 'static,
        P: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.lock();
        handlers.abort.push((id, Arc::new(abort)));
        handlers.post_abort.push((id, Arc::new(post_abort)));
        AbortRegistration {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Run every abort handler, then every post-abort handler.
    pub fn trigger(&self) {
        // Handlers run outside the lock so they may register or deregister.
        let (abort, post_abort): (Vec<Handler>, Vec<Handler>) = {
            let handlers = self.handlers.lock();
            (
                handlers.abort.iter().map(|(_, h)| Arc::clone(h)).collect(),
                handlers.post_abort.iter().map(|(_, h)| Arc::clone(h)).collect(),
            )
        };
        info!(handlers = abort.len(), "abort requested");
        for handler in &abort {
            handler();
        }
        for handler in &post_abort {
            handler();
        }
    }

    /// Number of registered handler pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.lock().abort.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deregister(&self, id: u64) {
        let mut handlers = self.handlers.lock();
        handlers.abort.retain(|(h, _)| *h != id);
        handlers.post_abort.retain(|(h, _)| *h != id);
    }
}

/// Guard returned by [`AbortRegistry::register`]; deregisters on drop.
#[must_use = "dropping the registration removes the handlers immediately"]
pub struct AbortRegistration {
    registry: Arc<AbortRegistry>,
    id: u64,
}

impl Drop for AbortRegistration {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
