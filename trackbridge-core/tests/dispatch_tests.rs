//! Integration tests for handle registration and cross-thread dispatch
//!
//! Covers the registry conflict invariant, per-handle FIFO delivery from many
//! producer threads, and cancellation of pending actions.

use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use trackbridge_core::*;

#[derive(Debug)]
struct Wrapper;

// ============================================================================
// REGISTRY INVARIANTS
// ============================================================================

proptest! {
    /// Registering the same handle twice without an unregister always conflicts
    #[test]
    fn double_register_always_conflicts(raw in 1u64..u64::MAX) {
        let registry = HandleRegistry::new();
        let handle = NativeHandle::from_raw(raw);
        let first = Arc::new(Wrapper);
        let second = Arc::new(Wrapper);

        prop_assert!(registry.register(handle, &first).is_ok());
        prop_assert_eq!(
            registry.register(handle, &second),
            Err(CoreError::RegistryConflict { handle })
        );
        prop_assert_eq!(registry.len(), 1);
    }

    /// An unregister in between makes the second registration succeed
    #[test]
    fn register_after_unregister_succeeds(raw in 1u64..u64::MAX) {
        let registry = HandleRegistry::new();
        let handle = NativeHandle::from_raw(raw);
        let wrapper = Arc::new(Wrapper);

        prop_assert!(registry.register(handle, &wrapper).is_ok());
        prop_assert!(registry.unregister(handle));
        prop_assert!(registry.register(handle, &wrapper).is_ok());
    }
}

// ============================================================================
// DISPATCH ORDERING
// ============================================================================

#[test]
fn test_per_handle_fifo_across_producer_threads() {
    let mut dispatcher = Dispatcher::new();
    let observed: Arc<Mutex<HashMap<u64, Vec<usize>>>> = Arc::new(Mutex::new(HashMap::new()));

    // Each producer thread owns one handle and posts a numbered sequence for it
    let producers: Vec<_> = (1..=4u64)
        .map(|raw| {
            let producer = dispatcher.handle();
            let observed = Arc::clone(&observed);
            thread::spawn(move || {
                let handle = NativeHandle::from_raw(raw);
                for seq in 0..100 {
                    let observed = Arc::clone(&observed);
                    producer
                        .post(handle, move || {
                            observed.lock().entry(raw).or_default().push(seq);
                        })
                        .unwrap();
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }

    assert_eq!(dispatcher.drain(), 400);

    let observed = observed.lock();
    for raw in 1..=4u64 {
        let expected: Vec<usize> = (0..100).collect();
        assert_eq!(observed[&raw], expected);
    }
}

#[test]
fn test_same_handle_two_threads_keeps_post_order() {
    let mut dispatcher = Dispatcher::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let handle = NativeHandle::from_raw(0x1000);

    // A is posted from one thread and fully enqueued before B is posted from another
    let producer_a = dispatcher.handle();
    let log_a = Arc::clone(&log);
    thread::spawn(move || {
        producer_a.post(handle, move || log_a.lock().push("A")).unwrap();
    })
    .join()
    .unwrap();

    let producer_b = dispatcher.handle();
    let log_b = Arc::clone(&log);
    thread::spawn(move || {
        producer_b.post(handle, move || log_b.lock().push("B")).unwrap();
    })
    .join()
    .unwrap();

    dispatcher.drain();
    assert_eq!(*log.lock(), vec!["A", "B"]);
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[test]
fn test_actions_for_dropped_wrapper_are_noops() {
    struct Counter(AtomicUsize);

    let mut dispatcher = Dispatcher::new();
    let registry = Arc::new(HandleRegistry::new());
    let handle = NativeHandle::from_raw(0x2000);
    let counter = Arc::new(Counter(AtomicUsize::new(0)));
    registry.register(handle, &counter).unwrap();

    let producer = dispatcher.handle();
    let registry_for_thread = Arc::clone(&registry);
    thread::spawn(move || {
        producer
            .post_resolved::<Counter, _>(&registry_for_thread, handle, |c| {
                c.0.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    })
    .join()
    .unwrap();

    // Wrapper goes away while the action is still queued
    let weak = Arc::downgrade(&counter);
    drop(counter);
    assert_eq!(dispatcher.drain(), 1);
    assert!(weak.upgrade().is_none());
    assert_eq!(registry.sweep_dead(), vec![handle]);
}

#[tokio::test]
async fn test_post_from_async_task() {
    let mut dispatcher = Dispatcher::new();
    let producer = dispatcher.handle();
    let hits = Arc::new(AtomicUsize::new(0));

    let task_hits = Arc::clone(&hits);
    tokio::task::spawn_blocking(move || {
        producer.post(NativeHandle::from_raw(1), move || {
            task_hits.fetch_add(1, Ordering::SeqCst);
        })
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(dispatcher.drain(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
