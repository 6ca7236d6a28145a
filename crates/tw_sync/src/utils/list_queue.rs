//! An unbounded MPMC FIFO queue.
//!
//! A classic two-lock queue (Michael & Scott): the head and tail live
//! behind independent [`SpinLock`]s so producers and consumers normally
//! don't contend with each other, and a sentinel node means `push` never
//! has to special-case an empty queue. [`lock_pop`]/[`lock_push`] expose
//! the locks directly so callers that need to move several items at once
//! (the scheduler's global-queue stealing path, for instance) can hold the
//! lock once instead of once per item.
//!
//! [`lock_pop`]: ListQueue::lock_pop
//! [`lock_push`]: ListQueue::lock_push

use std::fmt;
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::utils::{SpinLock, SpinLockGuard};

struct Node<T> {
    data: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Node<T> {
        Box::into_raw(Box::new(Node { data: None, next: AtomicPtr::new(ptr::null_mut()) }))
    }
}

/// An unbounded multi-producer multi-consumer FIFO queue.
pub struct ListQueue<T> {
    head: SpinLock<*mut Node<T>>,
    tail: SpinLock<*mut Node<T>>,
    len: AtomicUsize,
}

unsafe impl<T: Send> Send for ListQueue<T> {}
unsafe impl<T: Send> Sync for ListQueue<T> {}

impl<T> UnwindSafe for ListQueue<T> {}
impl<T> RefUnwindSafe for ListQueue<T> {}

impl<T> ListQueue<T> {
    /// Creates a new, empty queue.
    ///
    /// `idle_limit` is accepted for API parity with a block-recycling
    /// design but unused by this node-per-item implementation.
    pub fn new(_idle_limit: usize) -> ListQueue<T> {
        let sentinel = Node::sentinel();
        ListQueue { head: SpinLock::new(sentinel), tail: SpinLock::new(sentinel), len: AtomicUsize::new(0) }
    }

    /// Pushes `value` onto the back of the queue.
    pub fn push(&self, value: T) {
        let mut guard = self.lock_push();
        guard.push(value);
    }

    /// Pops a value off the front of the queue, or `None` if empty.
    pub fn pop(&self) -> Option<T> {
        let mut guard = self.lock_pop();
        guard.pop()
    }

    /// Returns `true` if the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }

    /// Returns the number of items in the queue.
    ///
    /// This is a best-effort count: concurrent pushes/pops may change it
    /// immediately after this call returns.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Locks the tail for a batch of pushes.
    pub fn lock_push(&self) -> PushLockGuard<'_, T> {
        PushLockGuard { queue: self, tail: self.tail.lock() }
    }

    /// Locks the head for a batch of pops.
    pub fn lock_pop(&self) -> PopLockGuard<'_, T> {
        PopLockGuard { queue: self, head: self.head.lock() }
    }
}

impl<T> Drop for ListQueue<T> {
    fn drop(&mut self) {
        let mut current = *self.head.get_mut();
        while !current.is_null() {
            let node = unsafe { Box::from_raw(current) };
            current = node.next.load(Ordering::Relaxed);
        }
    }
}

impl<T> Default for ListQueue<T> {
    fn default() -> ListQueue<T> {
        ListQueue::new(16)
    }
}

impl<T> fmt::Debug for ListQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("ListQueue { .. }")
    }
}

/// A held lock on a [`ListQueue`]'s tail, allowing several pushes without
/// re-acquiring the lock.
pub struct PushLockGuard<'a, T> {
    queue: &'a ListQueue<T>,
    tail: SpinLockGuard<'a, *mut Node<T>>,
}

impl<T> PushLockGuard<'_, T> {
    /// Pushes `value` onto the back of the queue.
    pub fn push(&mut self, value: T) {
        let new_node = Box::into_raw(Box::new(Node { data: Some(value), next: AtomicPtr::new(ptr::null_mut()) }));

        unsafe {
            (**self.tail).next.store(new_node, Ordering::Release);
        }
        *self.tail = new_node;
        self.queue.len.fetch_add(1, Ordering::AcqRel);
    }
}

/// A held lock on a [`ListQueue`]'s head, allowing several pops without
/// re-acquiring the lock.
pub struct PopLockGuard<'a, T> {
    queue: &'a ListQueue<T>,
    head: SpinLockGuard<'a, *mut Node<T>>,
}

impl<T> PopLockGuard<'_, T> {
    /// Pops a value off the front of the queue, or `None` if empty.
    pub fn pop(&mut self) -> Option<T> {
        let old_head = *self.head;
        let next = unsafe { (*old_head).next.load(Ordering::Acquire) };

        if next.is_null() {
            return None;
        }

        let value = unsafe { (*next).data.take() };
        *self.head = next;
        unsafe {
            drop(Box::from_raw(old_head));
        }
        self.queue.len.fetch_sub(1, Ordering::AcqRel);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn smoke() {
        let q = ListQueue::new(16);
        assert!(q.is_empty());
        q.push(1);
        q.push(2);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn batch_lock() {
        let q = ListQueue::new(16);
        {
            let mut push = q.lock_push();
            for i in 0..10 {
                push.push(i);
            }
        }
        let mut popped = Vec::new();
        {
            let mut pop = q.lock_pop();
            while let Some(v) = pop.pop() {
                popped.push(v);
            }
        }
        assert_eq!(popped, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn spsc() {
        const COUNT: usize = 20_000;
        let q = ListQueue::new(16);

        thread::scope(|s| {
            s.spawn(|| {
                for i in 0..COUNT {
                    q.push(i);
                }
            });

            s.spawn(|| {
                let mut next = 0;
                while next < COUNT {
                    if let Some(v) = q.pop() {
                        assert_eq!(v, next);
                        next += 1;
                    }
                }
            });
        });
    }

    #[test]
    fn mpmc() {
        const COUNT: usize = 20_000;
        const THREADS: usize = 4;

        let q = ListQueue::new(16);
        let seen: Vec<_> = (0..COUNT).map(std::sync::atomic::AtomicUsize::new).collect();
        let total_popped = AtomicUsize::new(0);

        thread::scope(|s| {
            for t in 0..THREADS {
                s.spawn(move || {
                    for i in (t..COUNT).step_by(THREADS) {
                        q.push(i);
                    }
                });
            }

            for _ in 0..THREADS {
                s.spawn(|| loop {
                    if let Some(v) = q.pop() {
                        seen[v].fetch_add(1, Ordering::SeqCst);
                        if total_popped.fetch_add(1, Ordering::SeqCst) + 1 == COUNT {
                            break;
                        }
                    } else if total_popped.load(Ordering::SeqCst) >= COUNT {
                        break;
                    }
                });
            }
        });

        for c in seen {
            assert_eq!(c.load(Ordering::SeqCst), 1);
        }
    }
}
