//! Miri-compatible tests for detecting undefined behavior.
//!
//! Run with: `cargo +nightly miri test --test miri_tests`
//!
//! These exercise the unsafe slot paths - initialization on push, move-out on
//! pop and eviction, and the drop of outstanding elements - with capacities
//! small enough for Miri to finish quickly.

use flexring_rs::{Config, OverflowPolicy, ResizableQueue};
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn miri_push_pop_round_trips() {
    let q: ResizableQueue<u64, 4> = ResizableQueue::default();

    for round in 0..3u64 {
        for i in 0..4 {
            assert!(q.try_push(round * 10 + i).is_ok(), "push failed in round {round}");
        }
        for i in 0..4 {
            assert_eq!(q.pop(), Some(round * 10 + i));
        }
        assert_eq!(q.pop(), None);
    }
}

#[test]
fn miri_eviction_moves_old_value_out() {
    let q: ResizableQueue<String, 2> =
        ResizableQueue::new(Config::new(2, OverflowPolicy::EvictOldest, false));

    assert!(q.try_push(String::from("first")).is_ok());
    assert!(q.try_push(String::from("second")).is_ok());

    let evicted = q.try_push(String::from("third")).unwrap();
    assert_eq!(evicted.as_deref(), Some("first"));

    assert_eq!(q.pop().as_deref(), Some("second"));
    assert_eq!(q.pop().as_deref(), Some("third"));
}

#[test]
fn miri_shrink_hands_out_owned_values() {
    let q: ResizableQueue<String, 4> = ResizableQueue::default();
    for name in ["a", "b", "c", "d"] {
        assert!(q.try_push(String::from(name)).is_ok());
    }

    let mut removed = Vec::new();
    assert!(q.set_capacity_with(1, |v| removed.push(v)));
    assert_eq!(removed, vec!["a", "b", "c"]);
    assert_eq!(q.pop().as_deref(), Some("d"));
}

#[test]
fn miri_drop_runs_once_per_outstanding_element() {
    static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

    struct DropTracker(#[allow(dead_code)] u64);

    impl Drop for DropTracker {
        fn drop(&mut self) {
            DROP_COUNT.fetch_add(1, Ordering::SeqCst);
        }
    }

    DROP_COUNT.store(0, Ordering::SeqCst);
    {
        let q: ResizableQueue<DropTracker, 4> =
            ResizableQueue::new(Config::new(4, OverflowPolicy::EvictOldest, false));

        for i in 0..6 {
            // pushes 4 and 5 evict; the evicted values drop here
            let _ = q.try_push(DropTracker(i));
        }
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 2);

        drop(q.pop());
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 3);

        q.set_capacity(2); // removes one element silently
        assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 4);

        // queue drops with 2 elements left
    }
    assert_eq!(DROP_COUNT.load(Ordering::SeqCst), 6);
}

#[test]
fn miri_zero_capacity_never_touches_slots() {
    let q: ResizableQueue<String, 2> = ResizableQueue::new(Config {
        initial_capacity: 0,
        ..Config::default()
    });

    assert!(q.try_push(String::from("rejected")).is_err());
    assert_eq!(q.pop(), None);

    q.set_capacity(2);
    assert!(q.try_push(String::from("accepted")).is_ok());
    assert_eq!(q.pop().as_deref(), Some("accepted"));
}

#[test]
fn miri_single_slot_queue_reuses_its_cell() {
    let q: ResizableQueue<Box<u64>, 1> =
        ResizableQueue::new(Config::new(1, OverflowPolicy::EvictOldest, false));

    assert!(q.try_push(Box::new(1)).is_ok());
    let evicted = q.try_push(Box::new(2)).unwrap();
    assert_eq!(evicted.as_deref(), Some(&1));
    assert_eq!(q.pop().as_deref(), Some(&2));
}
