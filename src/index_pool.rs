use crate::index_queue::IndexQueue;
use crate::invariants::debug_assert_release_accepted;

/// Lock-free MPMC pool of free slot indices.
///
/// Producers draw an index here before writing a slot; consumers return the
/// index after reading one. The pool reuses the cyclic index queue seeded with
/// the first `free` indices - the FIFO order it happens to provide is an
/// implementation detail, not part of the contract.
pub(crate) struct IndexPool<const N: usize> {
    free: IndexQueue<N>,
}

impl<const N: usize> IndexPool<N> {
    /// Creates a pool holding the indices `0..free`.
    ///
    /// Seeding fewer than `N` indices leaves the remainder out of circulation;
    /// the resizer owns those from the start.
    pub(crate) fn with_free(free: usize) -> Self {
        Self {
            free: IndexQueue::with_first(free),
        }
    }

    /// Removes and returns some free index, or `None` when every index is in
    /// use.
    #[inline]
    pub(crate) fn acquire(&self) -> Option<usize> {
        self.free.try_dequeue()
    }

    /// Returns an index to the pool.
    ///
    /// The caller must hold exclusive ownership of `slot`: it is in neither
    /// the pool nor the used-index queue. A double release is caught by the
    /// debug assertion; release builds ignore the rejected index.
    #[inline]
    pub(crate) fn release(&self, slot: usize) {
        let accepted = self.free.try_enqueue(slot);
        debug_assert_release_accepted!(accepted, slot);
    }

    /// Best-effort snapshot of the number of free indices.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.free.len()
    }
}
