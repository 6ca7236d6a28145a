//! Concurrency primitives shared by the `taskwell` scheduler.
//!
//! This crate collects the low-level building blocks a work-stealing
//! executor needs and that the standard library doesn't provide directly:
//! a cache-line padded wrapper, a spinning backoff helper, a minimal
//! spinlock (`Futex`/`SpinLock`), and two concurrent queues (`ArrayQueue`,
//! a bounded MPMC ring buffer, and `ListQueue`, an unbounded MPMC two-lock
//! linked queue). It also exposes `ArrayDeque`, a fixed-capacity ring-buffer
//! deque used as scratch storage by the scheduler's stealing paths.

pub mod collections;
pub mod utils;
