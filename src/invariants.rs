//! Debug assertion macros for the index-ownership invariants.
//!
//! Violations of these invariants are programmer errors (a double release, an
//! index conjured out of thin air) and indicate either memory corruption or a
//! mis-ordered publish. They are checked in debug builds only; release builds
//! carry zero overhead.

/// Assert that a slot index names an actual storage cell.
///
/// Every index travelling through the pool or the used-index queue must lie
/// in `0..max`.
macro_rules! debug_assert_slot_in_range {
    ($slot:expr, $max:expr) => {
        debug_assert!(
            $slot < $max,
            "slot index {} outside the storage range 0..{}",
            $slot,
            $max
        )
    };
}

/// Assert that publishing an index into the used-index queue was accepted.
///
/// A producer only publishes an index it acquired from the pool (or stole from
/// the queue itself), so the queue can never be full at that point. A rejected
/// publish means more indices are in flight than slots exist.
macro_rules! debug_assert_publish_accepted {
    ($accepted:expr, $slot:expr) => {
        debug_assert!(
            $accepted,
            "publish of slot {} rejected: more indices in flight than slots exist",
            $slot
        )
    };
}

/// Assert that returning an index to the free pool was accepted.
///
/// The pool holds at most one copy of each index; a rejected release means the
/// caller released an index it did not own.
macro_rules! debug_assert_release_accepted {
    ($accepted:expr, $slot:expr) => {
        debug_assert!(
            $accepted,
            "double release detected: slot {} rejected by the free pool",
            $slot
        )
    };
}

/// Assert that the number of published elements never exceeds the active
/// capacity.
macro_rules! debug_assert_len_bounded {
    ($len:expr, $cap:expr) => {
        debug_assert!(
            $len <= $cap,
            "queue length {} exceeds capacity {}",
            $len,
            $cap
        )
    };
}

pub(crate) use debug_assert_len_bounded;
pub(crate) use debug_assert_publish_accepted;
pub(crate) use debug_assert_release_accepted;
pub(crate) use debug_assert_slot_in_range;
