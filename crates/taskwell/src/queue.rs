//! The four work-queue variants: bounded/unbounded crossed with
//! plain-FIFO/attributed-priority.
//!
//! All four share the [`WorkQueue`] contract (`put`, `try_put`, `try_take`,
//! `deactivate`, `is_empty`, `is_active`), letting [`TaskPool`](crate::pool::TaskPool)
//! stay generic over queue strategy at compile time rather than dispatching
//! through a trait object.
//!
//! [`Unbounded`] is a thin wrapper over [`tw_sync::ListQueue`] (the two-lock
//! sentinel-node queue `spec.md` names directly) and is what the pool uses
//! for its global queue. [`Bounded`] adds high/low watermark backpressure on
//! top of a `Mutex`+`Condvar`, exactly as the original `bounded_fifo.hpp`
//! does. The priority variants add a `BinaryHeap` under the same lock
//! discipline as their FIFO counterparts.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tw_sync::utils::{ListQueue, PopLockGuard, PushLockGuard};

use crate::config::Watermarks;
use crate::error::TaskRejected;

/// Shared contract for all four work-queue variants.
pub trait WorkQueue<T> {
    /// Puts `value` into the queue, blocking if the variant applies
    /// backpressure and there is no room. Fails with [`TaskRejected`] if the
    /// queue is deactivated (before or during the wait).
    fn put(&self, value: T) -> Result<(), TaskRejected>;

    /// Non-blocking put: fails with [`TaskRejected`] immediately if the
    /// queue is deactivated or (for bounded variants) full.
    fn try_put(&self, value: T) -> Result<(), TaskRejected>;

    /// Removes and returns the next item, or `None` if the queue is
    /// currently empty. Never blocks.
    fn try_take(&self) -> Option<T>;

    /// Marks the queue inactive: wakes any producer blocked in `put`, and
    /// all subsequent `put`/`try_put` calls fail.
    fn deactivate(&self);

    /// Returns `true` if the queue currently holds no items.
    fn is_empty(&self) -> bool;

    /// Returns `true` if the queue has not been deactivated.
    fn is_active(&self) -> bool;
}

// -----------------------------------------------------------------------------
// Prioritized

/// A work item carrying a user priority attribute.
///
/// Ordered by priority only — ties break in arrival-independent order, as
/// `spec.md` §5 specifies. Resolves Open Question (b): the default
/// ordering treats the *smallest* priority value as highest priority
/// (popped first), matching the original's default `less` comparator.
pub struct Prioritized<T, P> {
    pub item: T,
    pub priority: P,
}

impl<T, P> Prioritized<T, P> {
    pub fn new(item: T, priority: P) -> Self {
        Prioritized { item, priority }
    }
}

impl<T, P: Ord> PartialEq for Prioritized<T, P> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}
impl<T, P: Ord> Eq for Prioritized<T, P> {}

impl<T, P: Ord> PartialOrd for Prioritized<T, P> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T, P: Ord> Ord for Prioritized<T, P> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reversed so `BinaryHeap` (a max-heap) pops the smallest priority first.
        other.priority.cmp(&self.priority)
    }
}

// -----------------------------------------------------------------------------
// Unbounded FIFO

/// An unbounded FIFO work queue: a thin wrapper over [`tw_sync::ListQueue`]
/// plus an activity flag. Used as the pool's global queue.
pub struct Unbounded<T> {
    queue: ListQueue<T>,
    active: AtomicBool,
}

impl<T> Unbounded<T> {
    pub fn new() -> Self {
        Unbounded { queue: ListQueue::default(), active: AtomicBool::new(true) }
    }

    /// Locks the tail for a batch of pushes; used by the pool's global-queue
    /// stealing path (`Worker::steal_global`) to drain many items under a
    /// single lock acquisition.
    pub fn lock_push(&self) -> PushLockGuard<'_, T> {
        self.queue.lock_push()
    }

    /// Locks the head for a batch of pops; see [`Unbounded::lock_push`].
    pub fn lock_pop(&self) -> PopLockGuard<'_, T> {
        self.queue.lock_pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl<T> Default for Unbounded<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> for Unbounded<T> {
    fn put(&self, value: T) -> Result<(), TaskRejected> {
        self.try_put(value)
    }

    fn try_put(&self, value: T) -> Result<(), TaskRejected> {
        if !self.active.load(Ordering::Acquire) {
            return Err(TaskRejected("queue deactivated"));
        }
        self.queue.push(value);
        Ok(())
    }

    fn try_take(&self) -> Option<T> {
        self.queue.pop()
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

// -----------------------------------------------------------------------------
// Unbounded priority

/// An unbounded priority work queue: a `BinaryHeap` under a single lock,
/// ordered as [`Prioritized`] describes.
pub struct UnboundedPriority<T, P: Ord> {
    heap: Mutex<BinaryHeap<Prioritized<T, P>>>,
    active: AtomicBool,
}

impl<T, P: Ord> UnboundedPriority<T, P> {
    pub fn new() -> Self {
        UnboundedPriority { heap: Mutex::new(BinaryHeap::new()), active: AtomicBool::new(true) }
    }
}

impl<T, P: Ord> Default for UnboundedPriority<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, P: Ord> WorkQueue<Prioritized<T, P>> for UnboundedPriority<T, P> {
    fn put(&self, value: Prioritized<T, P>) -> Result<(), TaskRejected> {
        self.try_put(value)
    }

    fn try_put(&self, value: Prioritized<T, P>) -> Result<(), TaskRejected> {
        if !self.active.load(Ordering::Acquire) {
            return Err(TaskRejected("queue deactivated"));
        }
        self.heap.lock().unwrap_or_else(|e| e.into_inner()).push(value);
        Ok(())
    }

    fn try_take(&self) -> Option<Prioritized<T, P>> {
        self.heap.lock().unwrap_or_else(|e| e.into_inner()).pop()
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    fn is_empty(&self) -> bool {
        self.heap.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

// -----------------------------------------------------------------------------
// Bounded FIFO

struct BoundedInner<T> {
    items: std::collections::VecDeque<T>,
}

/// A bounded FIFO work queue with high/low watermark backpressure, exactly
/// as `original_source/include/boost/task/bounded_fifo.hpp` implements it:
/// `put` blocks while active and `len >= high`, and `try_take` wakes
/// blocked producers once `len` falls to `low` (one producer if
/// `low == high`, all of them otherwise).
pub struct Bounded<T> {
    inner: Mutex<BoundedInner<T>>,
    not_full: Condvar,
    high: usize,
    low: usize,
    active: AtomicBool,
}

impl<T> Bounded<T> {
    pub fn new(high: usize, low: usize) -> Self {
        Bounded {
            inner: Mutex::new(BoundedInner { items: std::collections::VecDeque::new() }),
            not_full: Condvar::new(),
            high,
            low,
            active: AtomicBool::new(true),
        }
    }

    /// Builds a bounded queue from a pre-validated [`Watermarks`] pair — the
    /// `{bounded,unbounded}_{fifo,prio}(hwm, lwm)` constructor form `spec.md`
    /// §6 names, routed through `Watermarks::new`'s `low <= high` check
    /// instead of trusting two bare `usize`s.
    pub fn with_watermarks(watermarks: Watermarks) -> Self {
        Self::new(watermarks.high(), watermarks.low())
    }

    /// Blocking put with a deadline: fails with [`TaskRejected`] if the
    /// deadline passes before room becomes available, or the queue is
    /// deactivated while waiting.
    pub fn put_until(&self, value: T, deadline: Instant) -> Result<(), TaskRejected> {
        self.put_inner(value, Some(deadline))
    }

    /// Blocking put with a timeout; see [`Bounded::put_until`].
    pub fn put_for(&self, value: T, timeout: Duration) -> Result<(), TaskRejected> {
        self.put_until(value, Instant::now() + timeout)
    }

    fn put_inner(&self, value: T, deadline: Option<Instant>) -> Result<(), TaskRejected> {
        if self.high == 0 {
            // A zero high watermark rejects every put immediately by
            // definition (spec.md §8): there is never room.
            return Err(TaskRejected("bounded queue has zero capacity"));
        }

        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if !self.active.load(Ordering::Acquire) {
                return Err(TaskRejected("queue deactivated"));
            }
            if guard.items.len() < self.high {
                guard.items.push_back(value);
                return Ok(());
            }
            guard = match deadline {
                None => self.not_full.wait(guard).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TaskRejected("put timed out waiting for room"));
                    }
                    let (g, timeout_result) = self
                        .not_full
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(|e| e.into_inner());
                    if timeout_result.timed_out() && g.items.len() >= self.high {
                        return Err(TaskRejected("put timed out waiting for room"));
                    }
                    g
                }
            };
        }
    }

    fn wake_after_take(&self, remaining: usize) {
        if remaining <= self.low {
            if self.low == self.high {
                self.not_full.notify_one();
            } else {
                self.not_full.notify_all();
            }
        }
    }
}

impl<T> WorkQueue<T> for Bounded<T> {
    fn put(&self, value: T) -> Result<(), TaskRejected> {
        self.put_inner(value, None)
    }

    fn try_put(&self, value: T) -> Result<(), TaskRejected> {
        if !self.active.load(Ordering::Acquire) {
            return Err(TaskRejected("queue deactivated"));
        }
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.items.len() >= self.high {
            return Err(TaskRejected("bounded queue is full"));
        }
        guard.items.push_back(value);
        Ok(())
    }

    fn try_take(&self) -> Option<T> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let value = guard.items.pop_front();
        let remaining = guard.items.len();
        drop(guard);
        if value.is_some() {
            self.wake_after_take(remaining);
        }
        value
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.not_full.notify_all();
    }

    fn is_empty(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).items.is_empty()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

// -----------------------------------------------------------------------------
// Bounded priority

struct BoundedPriorityInner<T, P: Ord> {
    heap: BinaryHeap<Prioritized<T, P>>,
}

/// A bounded priority work queue: [`Bounded`]'s watermark discipline over a
/// `BinaryHeap` instead of a `VecDeque`.
pub struct BoundedPriority<T, P: Ord> {
    inner: Mutex<BoundedPriorityInner<T, P>>,
    not_full: Condvar,
    high: usize,
    low: usize,
    active: AtomicBool,
}

impl<T, P: Ord> BoundedPriority<T, P> {
    pub fn new(high: usize, low: usize) -> Self {
        BoundedPriority {
            inner: Mutex::new(BoundedPriorityInner { heap: BinaryHeap::new() }),
            not_full: Condvar::new(),
            high,
            low,
            active: AtomicBool::new(true),
        }
    }

    /// See [`Bounded::with_watermarks`].
    pub fn with_watermarks(watermarks: Watermarks) -> Self {
        Self::new(watermarks.high(), watermarks.low())
    }

    pub fn put_until(&self, value: Prioritized<T, P>, deadline: Instant) -> Result<(), TaskRejected> {
        self.put_inner(value, Some(deadline))
    }

    pub fn put_for(&self, value: Prioritized<T, P>, timeout: Duration) -> Result<(), TaskRejected> {
        self.put_until(value, Instant::now() + timeout)
    }

    fn put_inner(&self, value: Prioritized<T, P>, deadline: Option<Instant>) -> Result<(), TaskRejected> {
        if self.high == 0 {
            return Err(TaskRejected("bounded queue has zero capacity"));
        }

        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if !self.active.load(Ordering::Acquire) {
                return Err(TaskRejected("queue deactivated"));
            }
            if guard.heap.len() < self.high {
                guard.heap.push(value);
                return Ok(());
            }
            guard = match deadline {
                None => self.not_full.wait(guard).unwrap_or_else(|e| e.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(TaskRejected("put timed out waiting for room"));
                    }
                    let (g, timeout_result) = self
                        .not_full
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(|e| e.into_inner());
                    if timeout_result.timed_out() && g.heap.len() >= self.high {
                        return Err(TaskRejected("put timed out waiting for room"));
                    }
                    g
                }
            };
        }
    }

    fn wake_after_take(&self, remaining: usize) {
        if remaining <= self.low {
            if self.low == self.high {
                self.not_full.notify_one();
            } else {
                self.not_full.notify_all();
            }
        }
    }
}

impl<T, P: Ord> WorkQueue<Prioritized<T, P>> for BoundedPriority<T, P> {
    fn put(&self, value: Prioritized<T, P>) -> Result<(), TaskRejected> {
        self.put_inner(value, None)
    }

    fn try_put(&self, value: Prioritized<T, P>) -> Result<(), TaskRejected> {
        if !self.active.load(Ordering::Acquire) {
            return Err(TaskRejected("queue deactivated"));
        }
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if guard.heap.len() >= self.high {
            return Err(TaskRejected("bounded queue is full"));
        }
        guard.heap.push(value);
        Ok(())
    }

    fn try_take(&self) -> Option<Prioritized<T, P>> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let value = guard.heap.pop();
        let remaining = guard.heap.len();
        drop(guard);
        if value.is_some() {
            self.wake_after_take(remaining);
        }
        value
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        self.not_full.notify_all();
    }

    fn is_empty(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).heap.is_empty()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unbounded_fifo_order() {
        let q: Unbounded<i32> = Unbounded::new();
        q.put(1).unwrap();
        q.put(2).unwrap();
        assert_eq!(q.try_take(), Some(1));
        assert_eq!(q.try_take(), Some(2));
        assert_eq!(q.try_take(), None);
    }

    #[test]
    fn unbounded_rejects_after_deactivate() {
        let q: Unbounded<i32> = Unbounded::new();
        q.deactivate();
        assert!(q.put(1).is_err());
    }

    #[test]
    fn priority_smallest_first() {
        let q: UnboundedPriority<&str, i32> = UnboundedPriority::new();
        q.put(Prioritized::new("low", 10)).unwrap();
        q.put(Prioritized::new("high", 1)).unwrap();
        q.put(Prioritized::new("mid", 5)).unwrap();
        assert_eq!(q.try_take().unwrap().item, "high");
        assert_eq!(q.try_take().unwrap().item, "mid");
        assert_eq!(q.try_take().unwrap().item, "low");
    }

    #[test]
    fn bounded_never_exceeds_high_watermark() {
        let q: Bounded<i32> = Bounded::new(4, 2);
        for i in 0..4 {
            q.try_put(i).unwrap();
        }
        assert!(q.try_put(4).is_err());
    }

    #[test]
    fn bounded_zero_watermark_rejects_put() {
        let q: Bounded<i32> = Bounded::new(0, 0);
        assert!(q.put(1).is_err());
        assert!(q.try_put(1).is_err());
    }

    #[test]
    fn bounded_with_watermarks_uses_validated_pair() {
        let w = crate::config::Watermarks::new(
            crate::config::HighWatermark::new(4),
            crate::config::LowWatermark::new(2),
        )
        .unwrap();
        let q: Bounded<i32> = Bounded::with_watermarks(w);
        for i in 0..4 {
            q.try_put(i).unwrap();
        }
        assert!(q.try_put(4).is_err());
    }

    #[test]
    fn bounded_construction_does_not_enforce_watermark_order() {
        // Watermark ordering (`low <= high`) is validated at the `Watermarks`
        // config layer (`config.rs`), not here; `Bounded::new` takes plain
        // `usize`s for the pool to wire up after validating.
        let q: Bounded<i32> = Bounded::new(4, 4);
        q.try_put(1).unwrap();
        assert_eq!(q.try_take(), Some(1));
    }

    #[test]
    fn bounded_backpressure_unblocks_producer() {
        let q = Arc::new(Bounded::<i32>::new(2, 1));
        q.try_put(1).unwrap();
        q.try_put(2).unwrap();

        let producer_q = Arc::clone(&q);
        let handle = thread::spawn(move || {
            producer_q.put(3).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.try_take(), Some(1));

        handle.join().unwrap();
        assert_eq!(q.try_take(), Some(2));
        assert_eq!(q.try_take(), Some(3));
    }

    #[test]
    fn bounded_put_until_times_out() {
        let q: Bounded<i32> = Bounded::new(1, 1);
        q.try_put(1).unwrap();
        let result = q.put_until(2, Instant::now() + Duration::from_millis(30));
        assert!(result.is_err());
    }

    #[test]
    fn deactivate_wakes_blocked_producer() {
        let q = Arc::new(Bounded::<i32>::new(1, 1));
        q.try_put(1).unwrap();

        let producer_q = Arc::clone(&q);
        let handle = thread::spawn(move || producer_q.put(2));

        thread::sleep(Duration::from_millis(20));
        q.deactivate();

        assert!(handle.join().unwrap().is_err());
    }
}
