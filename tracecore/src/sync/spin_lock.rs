//! # Spin Lock (Exclusive + Shared)
//!
//! A one-word busy-wait lock that is safe to touch from an asynchronous
//! signal handler: no syscalls, no queueing, no allocation.
//!
//! ## State Encoding
//!
//! ```text
//!   0   free
//!   1   held exclusively
//!  -n   held shared by n readers
//! ```
//!
//! Every transition is a compare-and-swap on that word. The `try_*` forms
//! return immediately and are the only forms allowed in signal context; the
//! blocking forms spin with [`std::hint::spin_loop`] and are for regular
//! threads (dump, clear) only.

use std::hint;
use std::sync::atomic::{AtomicIsize, Ordering};

/// Busy-wait exclusive/shared lock
#[derive(Debug, Default)]
pub struct SpinLock {
    state: AtomicIsize,
}

impl SpinLock {
    /// Create an unlocked lock
    #[must_use]
    pub const fn new() -> Self {
        Self { state: AtomicIsize::new(0) }
    }

    /// Attempt `0 → 1`. Never blocks.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.state.compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed).is_ok()
    }

    /// Spin until the lock is held exclusively. Not for signal context.
    pub fn lock(&self) {
        while !self.try_lock() {
            hint::spin_loop();
        }
    }

    /// Release an exclusive hold.
    #[inline]
    pub fn unlock(&self) {
        let previous = self.state.fetch_sub(1, Ordering::Release);
        debug_assert_eq!(previous, 1, "unlock without exclusive hold");
    }

    /// Join the shared holders unless the lock is held exclusively.
    ///
    /// Retries only while other readers race on the counter; returns `false`
    /// as soon as an exclusive holder is observed.
    #[inline]
    pub fn try_lock_shared(&self) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);
        while current <= 0 {
            match self.state.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
        false
    }

    /// Spin until a shared hold is obtained. Not for signal context.
    pub fn lock_shared(&self) {
        while !self.try_lock_shared() {
            hint::spin_loop();
        }
    }

    /// Release a shared hold.
    #[inline]
    pub fn unlock_shared(&self) {
        let previous = self.state.fetch_add(1, Ordering::Release);
        debug_assert!(previous < 0, "unlock_shared without shared hold");
    }

    /// Returns true if nobody holds the lock (racy; diagnostics only)
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.state.load(Ordering::Relaxed) == 0
    }
}
