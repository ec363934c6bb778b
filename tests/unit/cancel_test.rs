//! Tests for cancellation tokens and the abort registry

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prometheus_test_scheduler::core::{AbortRegistry, CancelToken};

#[test]
fn test_clones_share_the_flag() {
    let token = CancelToken::new();
    let clone = token.clone();
    clone.cancel();
    assert!(token.is_cancelled());
    assert!(!token.is_acknowledged());
    assert!(token.sleep(Duration::from_secs(5)));
}

#[test]
fn test_registry_runs_every_registered_pair() {
    let registry = Arc::new(AbortRegistry::new());
    let (first, second) = (CancelToken::new(), CancelToken::new());
    let (a1, p1, a2, p2) = (first.clone(), first.clone(), second.clone(), second.clone());
    let _r1 = registry.register(move || a1.cancel(), move || p1.acknowledge());
    let _r2 = registry.register(move || a2.cancel(), move || p2.acknowledge());
    assert_eq!(registry.len(), 2);

    registry.trigger();

    for token in [&first, &second] {
        assert!(token.is_cancelled());
        assert!(token.is_acknowledged());
    }
}

#[test]
fn test_handler_may_deregister_during_trigger() {
    let registry = Arc::new(AbortRegistry::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let slot = Arc::new(parking_lot::Mutex::new(None));
    let (c, s) = (Arc::clone(&calls), Arc::clone(&slot));
    let registration = registry.register(
        move || {
            c.fetch_add(1, Ordering::SeqCst);
            s.lock().take();
        },
        || {},
    );
    *slot.lock() = Some(registration);

    registry.trigger();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(registry.is_empty());
}

#[test]
fn test_global_registry_is_shared() {
    assert!(Arc::ptr_eq(&AbortRegistry::global(), &AbortRegistry::global()));
}
