//! Relaxed-order atomic reference counter.
//!
//! [`RefCount`] is the counter protocol used by data shared across
//! logical-process boundaries (packet tag blobs). The orderings are the
//! weakest that keep the protocol sound:
//!
//! - increments are `Relaxed` — a new reference is only ever created by a
//!   thread that already holds one, so no ordering is needed;
//! - decrements are `Release` — they publish the dropper's prior writes;
//! - the thread that observes the count reach zero must call
//!   [`RefCount::fence_before_reclaim`] before touching the guarded data.

use std::sync::atomic::{fence, AtomicU32, Ordering};

/// Atomic u32 reference counter with the relaxed/release/acquire-fence
/// protocol.
#[derive(Debug)]
pub struct RefCount {
    count: AtomicU32,
}

// Compile-time assertion: the counter is shared across worker threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<RefCount>();
};

impl RefCount {
    /// Create a counter with the given initial value.
    pub fn new(count: u32) -> RefCount {
        RefCount {
            count: AtomicU32::new(count),
        }
    }

    /// Current value (acquire).
    pub fn get(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// Store a value (release).
    pub fn set(&self, count: u32) {
        self.count.store(count, Ordering::Release);
    }

    /// Increment, returning the previous value. Relaxed.
    pub fn inc(&self) -> u32 {
        self.count.fetch_add(1, Ordering::Relaxed)
    }

    /// Decrement, returning the previous value. Release.
    ///
    /// A return value of 1 means the caller observed the count reach
    /// zero and is responsible for reclamation — after calling
    /// [`fence_before_reclaim`](RefCount::fence_before_reclaim).
    pub fn dec(&self) -> u32 {
        self.count.fetch_sub(1, Ordering::Release)
    }

    /// Acquire fence pairing with the release decrements of other
    /// droppers. Must run before the zero-observer reclaims the data.
    pub fn fence_before_reclaim() {
        fence(Ordering::Acquire);
    }
}

impl Default for RefCount {
    fn default() -> Self {
        RefCount::new(0)
    }
}
