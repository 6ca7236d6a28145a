use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A spawned unit of work, wrapped only to give it a crate-local [`Future`]
/// impl that doesn't leak `async_task::Task` itself into [`Handle`](crate::handle::Handle)'s
/// public API. Every `taskwell` task is always held behind a `Handle`, which
/// owns its one `Task` for its whole life and polls it to completion or lets
/// it drop on interruption, so the `detach`/`cancel`/`is_finished` surface
/// `async_task::Task` otherwise offers a free-standing caller has no use here.
#[must_use = "tasks are cancelled when dropped"]
#[repr(transparent)]
pub(crate) struct Task<T>(pub(crate) async_task::Task<T>);

impl<T> Unpin for Task<T> {}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        Pin::new(&mut this.0).poll(cx)
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
