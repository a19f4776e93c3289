use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe operation counters.
///
/// Uses atomic counters with `Relaxed` ordering since these are purely
/// statistical - no control flow depends on exact values, and eventual
/// visibility is acceptable for observability.
#[derive(Debug, Default)]
pub struct Metrics {
    pushes: AtomicU64,
    pops: AtomicU64,
    evictions: AtomicU64,
    removed: AtomicU64,
    capacity_changes: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count successfully pushed elements.
    #[inline]
    pub fn add_pushes(&self, n: u64) {
        self.pushes.fetch_add(n, Ordering::Relaxed);
    }

    /// Count popped elements.
    #[inline]
    pub fn add_pops(&self, n: u64) {
        self.pops.fetch_add(n, Ordering::Relaxed);
    }

    /// Count elements evicted by an overflowing push.
    #[inline]
    pub fn add_evictions(&self, n: u64) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    /// Count elements removed by a capacity shrink.
    #[inline]
    pub fn add_removed(&self, n: u64) {
        self.removed.fetch_add(n, Ordering::Relaxed);
    }

    /// Count completed capacity changes.
    #[inline]
    pub fn add_capacity_changes(&self, n: u64) {
        self.capacity_changes.fetch_add(n, Ordering::Relaxed);
    }

    /// Take a snapshot of the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pushes: self.pushes.load(Ordering::Relaxed),
            pops: self.pops.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            capacity_changes: self.capacity_changes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of the operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub pushes: u64,
    pub pops: u64,
    pub evictions: u64,
    pub removed: u64,
    pub capacity_changes: u64,
}
