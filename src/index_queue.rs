use crate::invariants::debug_assert_slot_in_range;
use crate::Backoff;
use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicU64, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// This is a bounded MPMC FIFO whose elements are slot indices, coordinated by
// per-cell sequence counters:
//
// ## Sequence Numbers
//
// `head` and `tail` are unbounded u64 counters; the cell for counter value `p`
// is `cells[p % N]` (no power-of-two requirement). A cell's `sequence` encodes
// its state relative to those counters:
// - `sequence == t`      -> ready for the producer claiming position `t`
// - `sequence == t + 1`  -> published, ready for the consumer at position `t`
// - `sequence == t + N`  -> consumed, ready for the producer one lap later
//
// With 2^64 counter values, wrap-around is not a practical concern: at one
// billion operations per second it takes centuries to exhaust.
//
// ## Memory Ordering Protocol
//
// **Producer (enqueue):**
// 1. Load `tail` with Relaxed, load the cell `sequence` with Acquire
// 2. Claim the position by compare-exchange on `tail` (Relaxed - the claim
//    transfers no data, only uniqueness)
// 3. Write the slot index into the cell (plain write - the claim is exclusive)
// 4. Store `sequence = t + 1` with Release (publishes the index, and
//    transitively everything the producer wrote before calling enqueue)
//
// **Consumer (dequeue):**
// 1. Load `head` with Relaxed, load the cell `sequence` with Acquire
//    (synchronizes with the producer's publish)
// 2. Claim by compare-exchange on `head` (Relaxed)
// 3. Read the slot index (plain read, claim is exclusive)
// 4. Store `sequence = t + N` with Release (recycles the cell)
//
// ## Full / Empty Confirmation
//
// A sequence that lags the expected value may mean "full"/"empty" - or that
// the opposing operation claimed the cell but has not published yet. The
// lagging observation is confirmed against the opposite counter behind a
// SeqCst fence; only an exact one-lap (resp. zero) distance reports
// full/empty, anything else retries. Without this, a caller could see a
// spurious failure while another thread is mid-operation.
//
// =============================================================================

/// One coordination cell of the cyclic buffer.
struct Cell {
    /// State counter for the cell; see the protocol notes above.
    sequence: AtomicU64,
    /// The slot index payload. Guarded by `sequence`: written only between a
    /// producer claim and its publish, read only between a consumer claim and
    /// its recycle.
    slot: UnsafeCell<usize>,
}

/// Bounded lock-free MPMC FIFO of slot indices.
///
/// This is the ordering mechanism of the queue: values never travel through
/// it, only the indices of the slots holding them. The same structure doubles
/// as the free-slot pool when seeded via [`IndexQueue::with_first`].
///
/// # Caller contract
///
/// An index must only be enqueued by its exclusive owner, and at most `N`
/// distinct indices may ever circulate. Both tiers above uphold this: every
/// index is either in this queue, in the pool, parked by the resizer, or held
/// by exactly one in-flight operation. The contract is what makes the `N == 1`
/// instantiation sound (there, "consumed" and "published one position earlier"
/// produce the same sequence value, and only index ownership distinguishes
/// them).
///
/// # Progress
///
/// Lock-free, not wait-free: an operation only retries because another
/// operation on the same position completed first or is about to.
pub(crate) struct IndexQueue<const N: usize> {
    /// Producer position counter (monotonic).
    tail: CacheAligned<AtomicU64>,
    /// Consumer position counter (monotonic).
    head: CacheAligned<AtomicU64>,
    cells: Box<[Cell]>,
}

// Safety: cell payloads are plain usize and every access is serialized by the
// claim/publish protocol on `sequence`.
unsafe impl<const N: usize> Send for IndexQueue<N> {}
unsafe impl<const N: usize> Sync for IndexQueue<N> {}

/// Compile-time check that the queue has at least one cell.
const fn assert_nonzero_capacity<const N: usize>() {
    assert!(N > 0, "queue capacity must be > 0");
}

impl<const N: usize> IndexQueue<N> {
    /// Cell distance of one full lap around the cyclic buffer.
    const LAP: u64 = N as u64;

    /// Creates an empty index queue.
    pub(crate) fn empty() -> Self {
        Self::with_first(0)
    }

    /// Creates an index queue pre-filled with the indices `0..filled`, in
    /// order. Used to seed the free pool without a construction-time drain.
    pub(crate) fn with_first(filled: usize) -> Self {
        assert_nonzero_capacity::<N>();
        debug_assert!(filled <= N, "cannot seed more indices than cells");

        let mut cells = Vec::with_capacity(N);
        for i in 0..N {
            // Seeded cells look exactly like published ones; the rest are
            // ready for the producer of their first lap.
            let (sequence, slot) = if i < filled { (i as u64 + 1, i) } else { (i as u64, 0) };
            cells.push(Cell {
                sequence: AtomicU64::new(sequence),
                slot: UnsafeCell::new(slot),
            });
        }

        Self {
            tail: CacheAligned::new(AtomicU64::new(filled as u64)),
            head: CacheAligned::new(AtomicU64::new(0)),
            cells: cells.into_boxed_slice(),
        }
    }

    /// Appends a slot index. Fails only when the queue genuinely holds `N`
    /// entries.
    pub(crate) fn try_enqueue(&self, slot: usize) -> bool {
        debug_assert_slot_in_range!(slot, N);
        let mut backoff = Backoff::new();

        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let cell = &self.cells[(tail % Self::LAP) as usize];
            let sequence = cell.sequence.load(Ordering::Acquire);

            if sequence == tail {
                // Cell is free for this position; claim it.
                if self
                    .tail
                    .compare_exchange_weak(tail, tail + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: winning the claim for position `tail` grants
                    // exclusive write access to this cell until the publish
                    // below; no other producer holds this position and no
                    // consumer proceeds before `sequence` becomes `tail + 1`.
                    unsafe { *cell.slot.get() = slot };
                    cell.sequence.store(tail + 1, Ordering::Release);
                    return true;
                }
                backoff.spin();
            } else if sequence < tail {
                // The cell still carries the entry from one lap back. That
                // usually means full - unless the consumer of that entry is
                // mid-dequeue. Confirm against `head` before giving up.
                fence(Ordering::SeqCst);
                let head = self.head.load(Ordering::Relaxed);
                if tail == head + Self::LAP {
                    return false;
                }
                backoff.spin();
            } else {
                // Another producer already claimed this position; catch up.
                backoff.spin();
            }
        }
    }

    /// Removes and returns the oldest slot index, or `None` when the queue is
    /// genuinely empty.
    pub(crate) fn try_dequeue(&self) -> Option<usize> {
        let mut backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Relaxed);
            let cell = &self.cells[(head % Self::LAP) as usize];
            let sequence = cell.sequence.load(Ordering::Acquire);
            let published = head + 1;

            if sequence == published {
                if self
                    .head
                    .compare_exchange_weak(head, head + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    // SAFETY: winning the claim for position `head` grants
                    // exclusive read access; the Acquire load of `sequence`
                    // above synchronized with the producer's publish.
                    let slot = unsafe { *cell.slot.get() };
                    cell.sequence.store(head + Self::LAP, Ordering::Release);
                    debug_assert_slot_in_range!(slot, N);
                    return Some(slot);
                }
                backoff.spin();
            } else if sequence < published {
                // Nothing published at this position - or a producer claimed
                // it and has not published yet. Confirm against `tail`.
                fence(Ordering::SeqCst);
                let tail = self.tail.load(Ordering::Relaxed);
                if tail == head {
                    return None;
                }
                backoff.spin();
            } else {
                // Another consumer already claimed this position; catch up.
                backoff.spin();
            }
        }
    }

    /// Best-effort snapshot of the number of entries.
    ///
    /// The counters are read independently, so the raw difference can
    /// momentarily stray outside the representable range; it is saturated
    /// into `[0, N]`.
    pub(crate) fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        tail.saturating_sub(head).min(Self::LAP) as usize
    }
}

// ---------------------------------------------------------------------
// HELPER: cache-aligned wrapper for the hot counters
// ---------------------------------------------------------------------

/// Wrapper type that ensures 128-byte alignment to prevent prefetcher-induced
/// false sharing on Intel/AMD CPUs (which may prefetch adjacent cache lines).
#[repr(align(128))]
struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}
