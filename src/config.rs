/// What a push does when every slot inside the active capacity is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// `try_push` fails and hands the rejected value back; nothing is evicted.
    DiscardNew,
    /// `try_push` reclaims the slot of the oldest element and returns the
    /// evicted value to the caller. Pushes succeed whenever the capacity is
    /// nonzero.
    EvictOldest,
}

/// Configuration for a [`ResizableQueue`](crate::ResizableQueue).
///
/// The policy is fixed at construction; there is no per-call override.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Capacity the queue starts out with. Values above the queue's
    /// compile-time maximum saturate at that maximum.
    pub initial_capacity: usize,
    /// Behaviour of `try_push` on a full queue.
    pub overflow_policy: OverflowPolicy,
    /// Enable the atomic operation counters (slight overhead).
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a configuration with custom settings.
    pub const fn new(
        initial_capacity: usize,
        overflow_policy: OverflowPolicy,
        enable_metrics: bool,
    ) -> Self {
        Self {
            initial_capacity,
            overflow_policy,
            enable_metrics,
        }
    }

    /// Same configuration with a different initial capacity.
    pub const fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // saturates at the compile-time maximum of the queue it configures
            initial_capacity: usize::MAX,
            overflow_policy: OverflowPolicy::DiscardNew,
            enable_metrics: false,
        }
    }
}

/// Full capacity, rejecting pushes when full (backpressure on the producer).
pub const LOSSLESS_CONFIG: Config = Config::new(usize::MAX, OverflowPolicy::DiscardNew, false);

/// Full capacity, overwriting the oldest element when full (latest-wins).
pub const LOSSY_CONFIG: Config = Config::new(usize::MAX, OverflowPolicy::EvictOldest, false);
