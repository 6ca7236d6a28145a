//! [`Handle`], the read end of a task's result sink plus its interruption
//! control (`spec.md` §4.8).
//!
//! Built directly over `async_task::Task<Outcome<T>>` rather than a
//! bespoke future type — per `SPEC_FULL.md` §3, `async-task`'s own
//! internal slot already *is* an at-most-once producer/consumer sink, so
//! there is nothing left for `taskwell` to reimplement there.
//!
//! `Handle<T>` is movable but, unlike the original's `shared_ptr`-backed
//! value type, not `Clone`: Rust's ownership model already gives a single
//! handle the "independent lifetime from the task body" property `spec.md`
//! asks for (the task's own result sink is still reference-counted
//! internally by `async-task`), so a second reference-counted layer on top
//! of the handle itself would duplicate what `std::sync::Arc<Handle<T>>`
//! already gives a caller who wants to share one. This mirrors widely-used
//! task handles elsewhere in the ecosystem (`std::thread::JoinHandle`,
//! `tokio::task::JoinHandle`), neither of which is `Clone` either.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Poll;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_io::Timer;

use crate::error::Outcome;
use crate::task::Task;

enum HandleState<T> {
    Pending(Task<Outcome<T>>),
    Ready(Outcome<T>),
    /// The outcome was already taken by polling this handle directly as a
    /// [`Future`] (see the `impl Future for Handle` below). Only reachable
    /// that way; the blocking methods never produce it.
    Consumed,
}

/// Joins [`new_thread`](crate::submit::new_thread)'s dedicated thread when
/// the last [`Handle`] still holding it drops, matching `spec.md` §4.9's
/// "joiner reference... joined on last release."
struct ThreadJoiner(Option<JoinHandle<()>>);

impl Drop for ThreadJoiner {
    fn drop(&mut self) {
        if let Some(thread) = self.0.take() {
            let _ = thread.join();
        }
    }
}

/// A reference to a task's result, with cancellation and wait operations.
pub struct Handle<T> {
    state: Mutex<HandleState<T>>,
    interrupt: Arc<AtomicBool>,
    /// Only set for [`new_thread`](crate::submit::new_thread); every other
    /// submission form has no dedicated OS thread to join.
    joiner: Option<ThreadJoiner>,
}

impl<T> Handle<T> {
    pub(crate) fn new(task: Task<Outcome<T>>, interrupt: Arc<AtomicBool>) -> Self {
        Handle { state: Mutex::new(HandleState::Pending(task)), interrupt, joiner: None }
    }

    /// Builds an already-ready handle, for adapters (`own_thread`) that run
    /// their body to completion before returning.
    pub(crate) fn ready(outcome: Outcome<T>, interrupt: Arc<AtomicBool>) -> Self {
        Handle { state: Mutex::new(HandleState::Ready(outcome)), interrupt, joiner: None }
    }

    /// Builds a handle backed by `new_thread`'s dedicated OS thread: the
    /// thread is joined when this handle (or whichever one it's moved into
    /// last) is dropped.
    pub(crate) fn new_with_joiner(task: Task<Outcome<T>>, interrupt: Arc<AtomicBool>, thread: JoinHandle<()>) -> Self {
        Handle {
            state: Mutex::new(HandleState::Pending(task)),
            interrupt,
            joiner: Some(ThreadJoiner(Some(thread))),
        }
    }

    /// Blocks until the result is available, consuming the handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle's outcome was already taken by awaiting it
    /// directly as a `Future`.
    pub fn get(self) -> Outcome<T> {
        match self.state.into_inner().unwrap_or_else(|e| e.into_inner()) {
            HandleState::Ready(outcome) => outcome,
            HandleState::Pending(mut task) => futures_lite::future::block_on(&mut task),
            HandleState::Consumed => panic!("Handle::get() called after its outcome was already taken"),
        }
    }

    /// Returns the result if already available without blocking, otherwise
    /// hands the handle back unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the handle's outcome was already taken by awaiting it
    /// directly as a `Future`.
    pub fn try_get(self) -> Result<Outcome<T>, Handle<T>> {
        let Handle { state, interrupt, joiner } = self;
        match state.into_inner().unwrap_or_else(|e| e.into_inner()) {
            HandleState::Ready(outcome) => Ok(outcome),
            HandleState::Pending(mut task) => {
                match futures_lite::future::block_on(futures_lite::future::poll_once(&mut task)) {
                    Some(outcome) => Ok(outcome),
                    None => Err(Handle { state: Mutex::new(HandleState::Pending(task)), interrupt, joiner }),
                }
            }
            HandleState::Consumed => panic!("Handle::try_get() called after its outcome was already taken"),
        }
    }

    /// Returns `true` if the result has become available, caching it
    /// internally if so. Non-consuming; idempotent.
    pub fn is_ready(&self) -> bool {
        self.advance()
    }

    /// Returns `true` if the task completed with a value. Always `false`
    /// once the handle's outcome has been taken via its `Future` impl.
    pub fn has_value(&self) -> bool {
        self.advance()
            && matches!(&*self.state.lock().unwrap_or_else(|e| e.into_inner()), HandleState::Ready(o) if o.has_value())
    }

    /// Returns `true` if the task completed with a captured panic. Always
    /// `false` once the handle's outcome has been taken via its `Future` impl.
    pub fn has_exception(&self) -> bool {
        self.advance()
            && matches!(&*self.state.lock().unwrap_or_else(|e| e.into_inner()), HandleState::Ready(o) if o.has_exception())
    }

    /// Sets the interruption flag. Idempotent; does not by itself stop the
    /// task — only cooperative checkpoints inside the body observe it.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    /// Returns `true` if [`Handle::interrupt`] has been called.
    pub fn interruption_requested(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }

    /// Blocks, without consuming the handle, until the result is available.
    pub fn wait(&self) {
        if self.advance() {
            return;
        }
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let HandleState::Pending(task) = &mut *guard {
            let outcome = futures_lite::future::block_on(task);
            *guard = HandleState::Ready(outcome);
        }
    }

    /// Blocks until the result is available or `deadline` passes. Returns
    /// `true` iff the result became available first.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        if self.advance() {
            return true;
        }

        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let HandleState::Pending(task) = &mut *guard else {
            return true;
        };

        let mut timer = Timer::at(deadline);
        let raced = futures_lite::future::block_on(futures_lite::future::poll_fn(|cx| {
            if let Poll::Ready(outcome) = Pin::new(&mut *task).poll(cx) {
                return Poll::Ready(Some(outcome));
            }
            if Pin::new(&mut timer).poll(cx).is_ready() {
                return Poll::Ready(None);
            }
            Poll::Pending
        }));

        match raced {
            Some(outcome) => {
                *guard = HandleState::Ready(outcome);
                true
            }
            None => false,
        }
    }

    /// Blocks until the result is available or `timeout` elapses. Returns
    /// `true` iff the result became available first.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }

    /// [`Handle::interrupt`] then [`Handle::wait`].
    pub fn interrupt_and_wait(&self) {
        self.interrupt();
        self.wait();
    }

    /// [`Handle::interrupt`] then [`Handle::wait_for`].
    pub fn interrupt_and_wait_for(&self, timeout: Duration) -> bool {
        self.interrupt();
        self.wait_for(timeout)
    }

    /// [`Handle::interrupt`] then [`Handle::wait_until`].
    pub fn interrupt_and_wait_until(&self, deadline: Instant) -> bool {
        self.interrupt();
        self.wait_until(deadline)
    }

    /// Tries, without blocking, to move a completed task's output into the
    /// cache. Returns `true` if the handle is (now, or already) ready.
    fn advance(&self) -> bool {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *guard {
            HandleState::Ready(_) | HandleState::Consumed => true,
            HandleState::Pending(task) => {
                match futures_lite::future::block_on(futures_lite::future::poll_once(task)) {
                    Some(outcome) => {
                        *guard = HandleState::Ready(outcome);
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

/// Cooperatively awaiting a handle — rather than calling the blocking
/// [`Handle::get`]/[`Handle::wait`] family — is how a task body waits on a
/// child it forked without tying up its worker: `spec.md` §4.3/§4.6 call
/// this out explicitly ("lets a running task ... wait on children without
/// tying up a worker — the worker can pick up other work in the interim").
/// Polling this `impl` never blocks the thread; it just forwards to the
/// underlying `async_task::Task`'s own poll, which is exactly what an
/// `.await` inside another task body needs.
///
/// Takes the outcome out on the first `Poll::Ready`, same as `get()`
/// consuming the handle; the sync query methods (`has_value`,
/// `has_exception`, ...) report `false` for a handle whose outcome has
/// already been taken this way.
impl<T> Future for Handle<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Outcome<T>> {
        let this = self.get_mut();
        let state = this.state.get_mut().unwrap_or_else(|e| e.into_inner());

        if matches!(state, HandleState::Ready(_)) {
            let HandleState::Ready(outcome) = std::mem::replace(state, HandleState::Consumed) else {
                unreachable!()
            };
            return Poll::Ready(outcome);
        }
        if matches!(state, HandleState::Consumed) {
            panic!("Handle polled again after its outcome was already taken");
        }

        let HandleState::Pending(task) = state else {
            unreachable!()
        };
        match Pin::new(task).poll(cx) {
            Poll::Ready(outcome) => {
                *state = HandleState::Consumed;
                Poll::Ready(outcome)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_thread_style_ready_handle() {
        let interrupt = Arc::new(AtomicBool::new(false));
        let handle: Handle<i32> = Handle::ready(Outcome::Value(7), interrupt);
        assert!(handle.is_ready());
        assert!(handle.has_value());
        assert!(!handle.has_exception());
        assert_eq!(handle.get().into_value(), 7);
    }

    #[test]
    fn interrupt_is_idempotent() {
        let interrupt = Arc::new(AtomicBool::new(false));
        let handle: Handle<i32> = Handle::ready(Outcome::Value(1), interrupt);
        handle.interrupt();
        handle.interrupt();
        assert!(handle.interruption_requested());
    }

    #[test]
    fn awaiting_an_already_ready_handle_yields_its_outcome() {
        let interrupt = Arc::new(AtomicBool::new(false));
        let handle: Handle<i32> = Handle::ready(Outcome::Value(9), interrupt);
        let outcome = futures_lite::future::block_on(handle);
        assert_eq!(outcome.into_value(), 9);
    }

    #[test]
    fn wait_is_idempotent() {
        let interrupt = Arc::new(AtomicBool::new(false));
        let handle: Handle<i32> = Handle::ready(Outcome::Value(1), interrupt);
        handle.wait();
        handle.wait();
        assert!(handle.is_ready());
    }
}
