use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::utils::Backoff;

/// A user level spin-lock without any associated data.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
/// use tw_sync::utils::Futex;
///
/// struct Foo {
///     data: Cell<i32>,
///     futex: Futex,
/// }
///
/// impl Foo {
///     fn get(&self) -> i32 {
///         self.futex.lock();
///         let v = self.data.get();
///         self.futex.unlock();
///         v
///     }
/// }
/// ```
pub struct Futex {
    state: AtomicBool,
}

impl Futex {
    /// Creates an unlocked `Futex`.
    #[inline(always)]
    pub const fn new() -> Self {
        Self { state: AtomicBool::new(false) }
    }

    /// Returns `true` if the futex is locked.
    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.state.load(Acquire)
    }

    /// Tries to lock `self` without blocking.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.state.compare_exchange(false, true, Acquire, Relaxed).is_ok()
    }

    /// Locks `self`, busy-waiting with plain spin-loop hints, never yielding
    /// the thread. Use [`Futex::lock`] for longer expected hold times.
    #[inline]
    pub fn quick_lock(&self) {
        loop {
            if self.try_lock() {
                return;
            }
            while self.state.load(Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    /// Locks `self`, busy-waiting with exponential backoff.
    #[inline]
    pub fn lock(&self) {
        let backoff = Backoff::new();
        loop {
            if self.try_lock() {
                return;
            }
            while self.state.load(Relaxed) {
                backoff.spin();
            }
        }
    }

    /// Force-unlocks the futex.
    #[inline(always)]
    pub fn unlock(&self) {
        self.state.store(false, Release);
    }
}

impl Default for Futex {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// An RAII scoped lock for [`Futex`]. Unlocks on drop.
pub struct FutexGuard<'a> {
    futex: &'a Futex,
}

impl<'a> FutexGuard<'a> {
    /// Wraps an already-locked `futex`. The lock is released when the guard drops.
    #[inline(always)]
    pub const fn new(futex: &'a Futex) -> FutexGuard<'a> {
        FutexGuard { futex }
    }
}

impl Drop for FutexGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.futex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_unlock() {
        let futex = Futex::new();
        assert!(!futex.is_locked());
        assert!(futex.try_lock());
        assert!(!futex.try_lock());
        futex.unlock();
        assert!(futex.try_lock());
    }

    #[test]
    fn guard_unlocks() {
        let futex = Futex::new();
        futex.lock();
        {
            let _guard = FutexGuard::new(&futex);
            assert!(futex.is_locked());
        }
        assert!(!futex.is_locked());
    }
}
