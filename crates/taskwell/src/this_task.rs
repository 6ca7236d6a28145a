//! In-task primitives: the handful of free functions a task body can call to
//! learn about its own execution context and cooperate with interruption
//! (`spec.md` §4.10).
//!
//! These have no object to be methods on — `spec.md`'s original groups them
//! as a `this_task` namespace rather than attaching them to the executor,
//! since a task body only ever has implicit access to "whichever task is
//! presently running on this thread", not a handle to itself.

use crate::callable;
use crate::error::Interrupted;
use crate::global_executor;

/// Returns `true` if the calling thread is a pool worker thread. `false` on
/// any other thread, including a `new_thread`/`own_thread` adapter's thread.
pub fn runs_in_pool() -> bool {
    global_executor::runs_in_pool()
}

/// Returns the calling thread's worker seat index, or `None` if it is not a
/// pool worker thread.
pub fn worker_id() -> Option<usize> {
    global_executor::current_worker_id()
}

/// Yields once to the scheduler, giving other work a chance to run before
/// this task's body resumes.
pub async fn yield_now() {
    futures_lite::future::yield_now().await
}

/// Returns whether the currently-running task has been asked to interrupt,
/// without acting on it. `false` outside a task body.
pub fn interruption_requested() -> bool {
    callable::interruption_requested()
}

/// Cooperative cancellation point for task bodies that return
/// `Result<T, Interrupted>`. Yields once, then returns `Err(Interrupted)` if
/// the task has been asked to interrupt; otherwise `Ok(())`.
///
/// Pairs with [`crate::error::Outcome::flatten_interrupted`] and
/// [`crate::pool::TaskPool::submit_cancellable`]: a body that ends its
/// natural loop with `this_task::checkpoint().await?` has its `?`-propagated
/// [`Interrupted`] collapsed straight into `Outcome::Interrupted` rather than
/// surfacing as `Outcome::Value(Err(Interrupted))`.
pub async fn checkpoint() -> Result<(), Interrupted> {
    yield_now().await;
    if interruption_requested() { Err(Interrupted) } else { Ok(()) }
}
