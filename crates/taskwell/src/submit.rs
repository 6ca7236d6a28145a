//! Submission adapters that produce a [`Handle`] without going through a
//! [`TaskPool`](crate::pool::TaskPool): `own_thread` runs synchronously on
//! the calling thread, `new_thread` spawns a dedicated thread, and `fork`
//! schedules onto the calling pool worker's own local seat.

use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use async_task::Runnable;

use crate::callable;
use crate::global_executor;
use crate::handle::Handle;
use crate::task::Task;

/// Runs `f` to completion synchronously on the calling thread and returns an
/// already-ready handle. Unlike the other adapters, `f` and its future need
/// not be `Send` or `'static`: nothing here ever crosses a thread boundary.
pub fn own_thread<F, Fut, T>(f: F) -> Handle<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let flag = Arc::new(AtomicBool::new(false));
    let outcome = futures_lite::future::block_on(callable::run_callable(f(), Arc::clone(&flag)));
    Handle::ready(outcome, flag)
}

/// Spawns `f` onto a dedicated, freshly-created OS thread and returns a
/// handle to it immediately.
///
/// Implemented as a minimal single-task executor: the returned
/// `async_task::Task` and its `Runnable` communicate over an `mpsc` channel,
/// with the dedicated thread looping on `recv` and running each `Runnable`
/// as it arrives — the same "channel as the schedule function's target"
/// shape `async-task`'s own documentation uses for a one-off executor.
///
/// The dedicated thread's `JoinHandle` is carried inside the returned
/// `Handle`, which joins it on drop (`spec.md` §4.9: "the handle's context
/// holds a joiner reference to that thread, joined on last release"). That
/// join is brief in practice — the thread's `recv` loop exits on its own
/// once the channel's last sender drops, which happens as soon as the
/// future finishes or is cancelled — but it is a real join, not a detached
/// thread left for the OS to reap at its own pace.
pub fn new_thread<F, Fut, T>(f: F) -> Handle<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let flag = Arc::new(AtomicBool::new(false));
    let body_flag = Arc::clone(&flag);
    let wrapped = callable::run_callable(f(), body_flag);

    let (tx, rx) = std::sync::mpsc::channel::<Runnable>();
    let (runnable, task) = async_task::spawn(wrapped, move |runnable| {
        let _ = tx.send(runnable);
    });
    runnable.schedule();

    let thread = thread::Builder::new()
        .name("taskwell-new-thread".to_string())
        .spawn(move || {
            while let Ok(runnable) = rx.recv() {
                runnable.run();
            }
        })
        .expect("failed to spawn dedicated task thread");

    Handle::new_with_joiner(Task(task), flag, thread)
}

/// Schedules `f` onto the calling thread's own local seat, bypassing the
/// global queue entirely.
///
/// # Panics
///
/// Panics if the calling thread is not a pool worker thread (checked via
/// [`global_executor::runs_in_pool`]), matching the precondition
/// `spec.md` §4.9 documents for `fork`.
///
/// The returned handle's interruption flag is not registered with any
/// pool's interrupt registry (no pool reference is reachable from a free
/// function running inside a worker), so `TaskPool::shutdown_now` cannot
/// proactively interrupt a forked task before draining it; the task still
/// runs to completion during that drain, just without its flag necessarily
/// already set.
pub fn fork<F, Fut, T>(f: F) -> Handle<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    assert!(global_executor::runs_in_pool(), "fork() called outside a pool worker");
    let flag = Arc::new(AtomicBool::new(false));
    let wrapped = callable::run_callable(f(), Arc::clone(&flag));
    let task = global_executor::spawn_local(wrapped);
    Handle::new(Task(task), flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_thread_runs_synchronously() {
        let handle = own_thread(|| async { 2 + 2 });
        assert!(handle.is_ready());
        assert_eq!(handle.get().into_value(), 4);
    }

    #[test]
    fn own_thread_captures_panics() {
        let handle = own_thread(|| async {
            panic!("deliberate");
            #[allow(unreachable_code)]
            ()
        });
        assert!(handle.get().has_exception());
    }

    #[test]
    fn new_thread_runs_and_reports_value() {
        let handle = new_thread(|| async { 6 * 7 });
        assert_eq!(handle.get().into_value(), 42);
    }

    #[test]
    fn dropping_the_handle_joins_the_dedicated_thread() {
        // Builds a handle the same way `new_thread` does (pairing a task
        // with a `JoinHandle` via `Handle::new_with_joiner`), but with the
        // dedicated thread's own exit gated on a channel the test controls,
        // so the thread can only reach its "I have exited" marker after the
        // test tells it to. Dropping the handle must block until that join
        // completes, so the marker is guaranteed visible right after drop —
        // not eventually, not racily.
        use crate::error::Outcome;
        use std::sync::atomic::Ordering;
        use std::sync::mpsc;

        let exited = Arc::new(AtomicBool::new(false));
        let exited_in_thread = Arc::clone(&exited);
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let thread = thread::spawn(move || {
            let _ = release_rx.recv();
            exited_in_thread.store(true, Ordering::Release);
        });

        let (runnable, task) = async_task::spawn(async { Outcome::<()>::Value(()) }, |runnable| runnable.run());
        runnable.schedule();
        let handle = Handle::new_with_joiner(Task(task), Arc::new(AtomicBool::new(false)), thread);

        release_tx.send(()).unwrap();
        drop(handle);

        assert!(exited.load(Ordering::Acquire));
    }

    #[test]
    #[should_panic(expected = "fork() called outside a pool worker")]
    fn fork_panics_outside_pool_worker() {
        let _ = fork(|| async { 1 });
    }
}
