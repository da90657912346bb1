//! Spinlock and spin-wait primitives used by the round executor.
//!
//! Workers synchronise twice per round at spin barriers and take a
//! coarse spinlock around executor-global mutations (the destroy list,
//! global-event scheduling, freelist interaction). Critical sections are
//! a handful of instructions, so spinning beats parking.

use std::sync::atomic::{AtomicBool, Ordering};

/// Coarse test-and-set spinlock.
///
/// Acquire is `exchange(true, Acquire)` in a spin loop; release is
/// `store(false, Release)`. Holders must not block or run handlers.
pub struct SpinLock {
    locked: AtomicBool,
}

// Compile-time assertion: the lock is shared by every worker.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<SpinLock>();
};

impl SpinLock {
    /// Create an unlocked lock.
    pub const fn new() -> SpinLock {
        SpinLock {
            locked: AtomicBool::new(false),
        }
    }

    /// Spin until the lock is acquired.
    pub fn lock(&self) -> SpinGuard<'_> {
        while self.locked.swap(true, Ordering::Acquire) {
            std::hint::spin_loop();
        }
        SpinGuard { lock: self }
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        SpinLock::new()
    }
}

/// RAII guard for [`SpinLock`]; releases on drop.
pub struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Spin until `cond` returns true.
pub fn spin_until(cond: impl Fn() -> bool) {
    while !cond() {
        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn guard_releases_on_drop() {
        let lock = SpinLock::new();
        drop(lock.lock());
        drop(lock.lock());
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        // A read-modify-write split across the critical section: any
        // lost update means exclusion failed. The value is an atomic
        // only because this workspace forbids unsafe; the loads and
        // stores are deliberately non-atomic as a pair.
        use std::sync::atomic::AtomicU64;
        let lock = Arc::new(SpinLock::new());
        let value = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let lock = lock.clone();
            let value = value.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    let _g = lock.lock();
                    let v = value.load(Ordering::Relaxed);
                    value.store(v + 1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(value.load(Ordering::Relaxed), 40_000);
    }
}
