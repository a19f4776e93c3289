//! FlexRing - Bounded Lock-Free MPMC Queue with Adjustable Capacity
//!
//! A fixed-maximum-size FIFO queue for any number of producer and consumer
//! threads, whose usable capacity can be moved anywhere in `0..=N` at runtime
//! while traffic continues. Element values stay put in their slots; only slot
//! indices travel through the lock-free machinery.
//!
//! # Key Features
//!
//! - Lock-free `try_push` / `pop` (per-cell sequence counters, CAS-claimed
//!   positions)
//! - Runtime `set_capacity` concurrent with producers and consumers
//! - Two full-queue policies, chosen at construction: reject the new element,
//!   or evict the oldest and hand it back
//! - No allocation after construction, no blocking, no system calls
//!
//! # Example
//!
//! ```
//! use flexring_rs::{Config, OverflowPolicy, ResizableQueue};
//!
//! let config = Config::new(4, OverflowPolicy::EvictOldest, false);
//! let queue: ResizableQueue<u64, 8> = ResizableQueue::new(config);
//!
//! for i in 0..4 {
//!     queue.try_push(i).unwrap();
//! }
//!
//! // Full: the oldest element makes room and comes back to us.
//! assert_eq!(queue.try_push(4), Ok(Some(0)));
//!
//! // Grow the window and keep pushing.
//! queue.set_capacity(8);
//! assert_eq!(queue.try_push(5), Ok(None));
//!
//! assert_eq!(queue.pop(), Some(1));
//! ```

mod backoff;
mod config;
mod index_pool;
mod index_queue;
mod invariants;
mod metrics;
mod queue;

pub use backoff::Backoff;
pub use config::{Config, OverflowPolicy, LOSSLESS_CONFIG, LOSSY_CONFIG};
pub use metrics::{Metrics, MetricsSnapshot};
pub use queue::{FullError, ResizableQueue};
