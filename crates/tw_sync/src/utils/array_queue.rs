//! A bounded MPMC queue backed by a fixed-size ring buffer.
//!
//! Ported from the `crossbeam-queue` ring-buffer algorithm: each slot
//! carries a `stamp` that encodes which "lap" around the buffer last wrote
//! or read it, so producers and consumers can make progress independently
//! without a single global lock.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::utils::{Backoff, CachePadded};

struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A bounded multi-producer multi-consumer queue.
///
/// Used as the fixed-capacity per-worker local deque in the scheduler: the
/// owning worker pushes/pops from one end while other workers steal from
/// the queue concurrently.
pub struct ArrayQueue<T> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    buffer: Box<[Slot<T>]>,
    one_lap: usize,
}

unsafe impl<T: Send> Send for ArrayQueue<T> {}
unsafe impl<T: Send> Sync for ArrayQueue<T> {}

impl<T> UnwindSafe for ArrayQueue<T> {}
impl<T> RefUnwindSafe for ArrayQueue<T> {}

impl<T> ArrayQueue<T> {
    /// Creates a new bounded queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `cap` is zero.
    pub fn new(cap: usize) -> ArrayQueue<T> {
        assert!(cap > 0, "capacity must be non-zero");

        let head = 0;
        let tail = 0;
        let one_lap = (cap + 1).next_power_of_two();

        let buffer: Box<[Slot<T>]> = (0..cap)
            .map(|i| Slot { stamp: AtomicUsize::new(i), value: UnsafeCell::new(MaybeUninit::uninit()) })
            .collect();

        ArrayQueue { head: CachePadded::new(AtomicUsize::new(head)), tail: CachePadded::new(AtomicUsize::new(tail)), buffer, one_lap }
    }

    /// Attempts to push `value` into the queue.
    ///
    /// Returns `Err(value)` if the queue is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let backoff = Backoff::new();
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            let index = tail & (self.one_lap - 1);
            let lap = tail & !(self.one_lap - 1);

            let new_tail = if index + 1 < self.buffer.len() { tail + 1 } else { lap.wrapping_add(self.one_lap) };

            let slot = &self.buffer[index];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if tail == stamp {
                match self.tail.compare_exchange_weak(tail, new_tail, Ordering::SeqCst, Ordering::Relaxed) {
                    Ok(_) => {
                        unsafe {
                            slot.value.get().write(MaybeUninit::new(value));
                        }
                        slot.stamp.store(tail + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(t) => {
                        tail = t;
                        backoff.spin();
                    }
                }
            } else if stamp.wrapping_add(self.one_lap) == tail + 1 {
                std::sync::atomic::fence(Ordering::SeqCst);
                let head = self.head.load(Ordering::Relaxed);

                if head.wrapping_add(self.one_lap) == tail {
                    return Err(value);
                }
                backoff.spin();
                tail = self.tail.load(Ordering::Relaxed);
            } else {
                backoff.spin();
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempts to pop an item off the front of the queue.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);

        loop {
            let index = head & (self.one_lap - 1);
            let lap = head & !(self.one_lap - 1);

            let slot = &self.buffer[index];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if head + 1 == stamp {
                let new = if index + 1 < self.buffer.len() { head + 1 } else { lap.wrapping_add(self.one_lap) };

                match self.head.compare_exchange_weak(head, new, Ordering::SeqCst, Ordering::Relaxed) {
                    Ok(_) => {
                        let value = unsafe { slot.value.get().read().assume_init() };
                        slot.stamp.store(head.wrapping_add(self.one_lap), Ordering::Release);
                        return Some(value);
                    }
                    Err(h) => {
                        head = h;
                        backoff.spin();
                    }
                }
            } else if stamp == head {
                std::sync::atomic::fence(Ordering::SeqCst);
                let tail = self.tail.load(Ordering::Relaxed);

                if tail == head {
                    return None;
                }
                backoff.spin();
                head = self.head.load(Ordering::Relaxed);
            } else {
                backoff.spin();
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Returns the fixed capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::SeqCst);
        head == tail
    }

    /// Returns `true` if the queue is at capacity.
    pub fn is_full(&self) -> bool {
        let tail = self.tail.load(Ordering::SeqCst);
        let head = self.head.load(Ordering::SeqCst);
        tail.wrapping_add(self.one_lap) == head.wrapping_add(self.one_lap * 2) || tail.wrapping_sub(head) == self.one_lap
    }

    /// Returns the number of items currently in the queue.
    ///
    /// This is only a snapshot: concurrent pushes/pops may have occurred by
    /// the time the caller observes the result.
    pub fn len(&self) -> usize {
        loop {
            let tail = self.tail.load(Ordering::SeqCst);
            let head = self.head.load(Ordering::SeqCst);

            if self.tail.load(Ordering::SeqCst) == tail {
                let hix = head & (self.one_lap - 1);
                let tix = tail & (self.one_lap - 1);

                return if hix < tix {
                    tix - hix
                } else if hix > tix {
                    self.buffer.len() - hix + tix
                } else if tail == head {
                    0
                } else {
                    self.buffer.len()
                };
            }
        }
    }
}

impl<T> Drop for ArrayQueue<T> {
    fn drop(&mut self) {
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let cap = self.buffer.len();

        let hix = head & (self.one_lap - 1);
        let tix = tail & (self.one_lap - 1);

        let mut count = if hix < tix {
            tix - hix
        } else if hix > tix {
            cap - hix + tix
        } else if head == tail {
            0
        } else {
            cap
        };

        let mut index = hix;
        while count > 0 {
            let slot = &mut self.buffer[index];
            unsafe {
                slot.value.get_mut().assume_init_drop();
            }
            index = if index + 1 < cap { index + 1 } else { 0 };
            count -= 1;
        }
    }
}

impl<T> fmt::Debug for ArrayQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("ArrayQueue { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn smoke() {
        let q = ArrayQueue::new(1);
        q.push(7).unwrap();
        assert_eq!(q.pop(), Some(7));

        q.push(8).unwrap();
        assert_eq!(q.pop(), Some(8));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn capacity() {
        let q = ArrayQueue::<i32>::new(3);
        assert_eq!(q.capacity(), 3);
    }

    #[test]
    fn len_empty_full() {
        let q = ArrayQueue::new(2);
        assert!(q.is_empty());
        q.push(1).unwrap();
        assert!(!q.is_empty());
        q.push(2).unwrap();
        assert!(q.is_full());
        assert!(q.push(3).is_err());
        assert_eq!(q.len(), 2);
        q.pop();
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn spsc() {
        const COUNT: usize = 10_000;
        let q = ArrayQueue::new(3);

        thread::scope(|s| {
            s.spawn(|| {
                for i in 0..COUNT {
                    loop {
                        if q.push(i).is_ok() {
                            break;
                        }
                    }
                }
            });

            s.spawn(|| {
                for i in 0..COUNT {
                    loop {
                        if let Some(x) = q.pop() {
                            assert_eq!(x, i);
                            break;
                        }
                    }
                }
            });
        });
    }

    #[test]
    fn mpmc() {
        const COUNT: usize = 5_000;
        const THREADS: usize = 4;

        let q = ArrayQueue::new(3);
        let v: Vec<_> = (0..COUNT).map(std::sync::atomic::AtomicUsize::new).collect();

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..COUNT / THREADS {
                        loop {
                            if let Some(n) = q.pop() {
                                v[n].fetch_add(1, Ordering::SeqCst);
                                break;
                            }
                        }
                    }
                });
            }

            for _ in 0..THREADS {
                s.spawn(|| {
                    for i in 0..COUNT / THREADS {
                        loop {
                            if q.push(i).is_ok() {
                                break;
                            }
                        }
                    }
                });
            }
        });

        for c in v {
            assert_eq!(c.load(Ordering::SeqCst), 1);
        }
    }
}
