//! End-to-end scenario 1 (`spec.md` §8): `fib(n) = fork(fib(n-1)) + fork(fib(n-2))`
//! on a pool of 4 workers, expecting `fib(10) == 55`.
//!
//! Each recursive call awaits its two forked children directly as
//! `Handle<u64>` futures rather than calling `get()`/`wait()`, so a task
//! deep in the recursion suspends cooperatively instead of parking its
//! worker thread while its children run — the property `spec.md` §4.3
//! calls out as the whole point of the suspendable-context design.

use std::future::Future;
use std::pin::Pin;

use taskwell::{fork, Handle, PoolSize, TaskPoolBuilder};

fn fib(n: u64) -> Pin<Box<dyn Future<Output = u64> + Send>> {
    Box::pin(async move {
        if n < 2 {
            return n;
        }
        let left: Handle<u64> = fork(move || fib(n - 1));
        let right: Handle<u64> = fork(move || fib(n - 2));
        let (a, b) = (left.await, right.await);
        a.into_value() + b.into_value()
    })
}

#[test]
fn fib_ten_via_fork_is_fifty_five() {
    let pool = TaskPoolBuilder::new().pool_size(PoolSize::new(4).unwrap()).build();
    let handle = pool.submit(|| fib(10));
    assert_eq!(handle.get().into_value(), 55);
    pool.shutdown();
}
