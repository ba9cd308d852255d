//! # Lock Stripes
//!
//! A fixed set of independent [`SpinLock`]s, each guarding one slot of
//! per-stripe data (frame buffers, scratch space). Signal handlers take one
//! stripe with `try_lock`; dump and clear take every stripe in ascending
//! index order so they can never deadlock against each other.
//!
//! Holding every stripe is represented by [`AllStripes`]. Operations that
//! need a quiescent store (snapshot, clear) take a reference to it as proof.

#![allow(unsafe_code)] // UnsafeCell access is gated by the stripe's SpinLock

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};

use super::SpinLock;
use crate::domain::StripeIndex;

/// How an [`AllStripes`] guard holds its stripes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldMode {
    /// Every stripe held exclusively (mutation, e.g. clear)
    Exclusive,
    /// Every stripe held shared (concurrent consistent snapshots)
    Shared,
}

/// Cache-line aligned lock + data pair
#[repr(align(64))]
struct Stripe<T> {
    lock: SpinLock,
    data: UnsafeCell<T>,
}

/// Fixed array of lock stripes with per-stripe data
pub struct StripeSet<T> {
    stripes: Box<[Stripe<T>]>,
}

// SAFETY: `data` is only reached through guards. Exclusive guards are unique
// (SpinLock CAS 0 → 1), so `T: Send` suffices for `&mut T`; shared guards
// hand out `&T` to several threads at once, hence `T: Sync`.
unsafe impl<T: Send> Send for StripeSet<T> {}
unsafe impl<T: Send + Sync> Sync for StripeSet<T> {}

impl<T> StripeSet<T> {
    /// Create `count` stripes, building each stripe's data with `init`.
    ///
    /// All allocation happens here, outside any signal context.
    pub fn new(count: usize, mut init: impl FnMut(StripeIndex) -> T) -> Self {
        let stripes = (0..count)
            .map(|i| Stripe { lock: SpinLock::new(), data: UnsafeCell::new(init(StripeIndex(i))) })
            .collect();
        Self { stripes }
    }

    /// Number of stripes
    #[must_use]
    pub fn len(&self) -> usize {
        self.stripes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stripes.is_empty()
    }

    /// Non-blocking exclusive acquisition. Signal-safe.
    ///
    /// Returns `None` if the stripe is held by anyone or the index is out of
    /// range.
    #[inline]
    pub fn try_lock(&self, index: StripeIndex) -> Option<StripeGuard<'_, T>> {
        let stripe = self.stripes.get(index.0)?;
        if stripe.lock.try_lock() {
            Some(StripeGuard { stripe, index })
        } else {
            None
        }
    }

    /// Non-blocking shared acquisition. Signal-safe.
    #[inline]
    pub fn try_lock_shared(&self, index: StripeIndex) -> Option<SharedStripeGuard<'_, T>> {
        let stripe = self.stripes.get(index.0)?;
        if stripe.lock.try_lock_shared() {
            Some(SharedStripeGuard { stripe, index })
        } else {
            None
        }
    }

    /// Spin for one stripe. Not for signal context.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    pub fn lock(&self, index: StripeIndex) -> StripeGuard<'_, T> {
        let stripe = &self.stripes[index.0];
        stripe.lock.lock();
        StripeGuard { stripe, index }
    }

    /// Take every stripe exclusively, in ascending order. Not for signal
    /// context.
    pub fn lock_all(&self) -> AllStripes<'_, T> {
        for stripe in &*self.stripes {
            stripe.lock.lock();
        }
        AllStripes { set: self, mode: HoldMode::Exclusive }
    }

    /// Take every stripe shared, in ascending order. Not for signal context.
    ///
    /// Several threads may hold this at once; recorders (which need an
    /// exclusive stripe) are locked out until every guard is dropped.
    pub fn lock_all_shared(&self) -> AllStripes<'_, T> {
        for stripe in &*self.stripes {
            stripe.lock.lock_shared();
        }
        AllStripes { set: self, mode: HoldMode::Shared }
    }
}

/// Exclusive hold on one stripe
pub struct StripeGuard<'a, T> {
    stripe: &'a Stripe<T>,
    index: StripeIndex,
}

impl<T> StripeGuard<'_, T> {
    #[must_use]
    pub fn index(&self) -> StripeIndex {
        self.index
    }
}

impl<T> Deref for StripeGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: exclusive hold on the stripe's lock.
        unsafe { &*self.stripe.data.get() }
    }
}

impl<T> DerefMut for StripeGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: exclusive hold on the stripe's lock.
        unsafe { &mut *self.stripe.data.get() }
    }
}

impl<T> Drop for StripeGuard<'_, T> {
    fn drop(&mut self) {
        self.stripe.lock.unlock();
    }
}

/// Shared hold on one stripe
pub struct SharedStripeGuard<'a, T> {
    stripe: &'a Stripe<T>,
    index: StripeIndex,
}

impl<T> SharedStripeGuard<'_, T> {
    #[must_use]
    pub fn index(&self) -> StripeIndex {
        self.index
    }
}

impl<T> Deref for SharedStripeGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: no exclusive holder can exist while we hold it shared.
        unsafe { &*self.stripe.data.get() }
    }
}

impl<T> Drop for SharedStripeGuard<'_, T> {
    fn drop(&mut self) {
        self.stripe.lock.unlock_shared();
    }
}

/// Hold on every stripe of a [`StripeSet`]
///
/// Released in descending order on drop.
pub struct AllStripes<'a, T> {
    set: &'a StripeSet<T>,
    mode: HoldMode,
}

impl<T> AllStripes<'_, T> {
    #[must_use]
    pub fn mode(&self) -> HoldMode {
        self.mode
    }

    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.mode == HoldMode::Exclusive
    }

    /// Read one stripe's data
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[must_use]
    pub fn get(&self, index: StripeIndex) -> &T {
        // SAFETY: every stripe is held, at least shared.
        unsafe { &*self.set.stripes[index.0].data.get() }
    }

    /// Mutate one stripe's data; `None` unless held exclusively
    pub fn get_mut(&mut self, index: StripeIndex) -> Option<&mut T> {
        if !self.is_exclusive() {
            return None;
        }
        let stripe = self.set.stripes.get(index.0)?;
        // SAFETY: every stripe is held exclusively and `&mut self` prevents
        // handing out two references to the same slot.
        Some(unsafe { &mut *stripe.data.get() })
    }
}

impl<T> Drop for AllStripes<'_, T> {
    fn drop(&mut self) {
        for stripe in self.set.stripes.iter().rev() {
            match self.mode {
                HoldMode::Exclusive => stripe.lock.unlock(),
                HoldMode::Shared => stripe.lock.unlock_shared(),
            }
        }
    }
}
