//! Error taxonomy: configuration failures, submission rejection, and the
//! per-task result enum surfaced through [`Handle`](crate::handle::Handle).

use std::any::Any;
use std::fmt;

/// Raised synchronously when a pool or queue is constructed with invalid
/// parameters. Unrecoverable by the caller.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pool size must be greater than zero")]
    InvalidPoolSize,
    #[error("stack size must be at least {minimum} bytes")]
    InvalidStackSize { minimum: usize },
    #[error("low watermark ({low}) must not exceed high watermark ({high})")]
    InvalidWatermark { low: usize, high: usize },
}

/// Returned by `submit`/`put` when the pool or queue has been deactivated,
/// or a bounded `put` timed out waiting for room.
#[derive(thiserror::Error, Debug)]
#[error("task rejected: {0}")]
pub struct TaskRejected(pub &'static str);

/// The three-way outcome of a task body.
///
/// This is the Rust realization of `spec.md`'s "result sink carrying
/// either a value, an exception, or an interruption sentinel" — one enum
/// covers both captured panics and cooperative interruption, since Rust
/// has no distinct catchable "interrupted" exception type to layer onto
/// panics.
pub enum Outcome<T> {
    /// The task body returned normally.
    Value(T),
    /// The task body panicked; the payload is the value passed to `panic!`.
    Panicked(Box<dyn Any + Send>),
    /// The task was interrupted before it produced a value.
    Interrupted,
}

impl<T> Outcome<T> {
    /// Returns `true` if this outcome carries a value.
    pub fn has_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    /// Returns `true` if this outcome carries a captured panic.
    pub fn has_exception(&self) -> bool {
        matches!(self, Outcome::Panicked(_))
    }

    /// Returns `true` if this outcome is an interruption sentinel.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Outcome::Interrupted)
    }

    /// Consumes the outcome, returning its value.
    ///
    /// # Panics
    ///
    /// Resumes the captured panic if the task body panicked, or panics
    /// with a generic message if the task was interrupted.
    pub fn into_value(self) -> T {
        match self {
            Outcome::Value(v) => v,
            Outcome::Panicked(payload) => std::panic::resume_unwind(payload),
            Outcome::Interrupted => panic!("task was interrupted before producing a value"),
        }
    }
}

/// Returned by [`crate::this_task::checkpoint`] when the current task has
/// been asked to interrupt. A task body that wants `?`-propagating
/// cancellation returns `Result<R, Interrupted>` and ends its natural loop
/// with `this_task::checkpoint().await?`; [`Outcome::flatten_interrupted`]
/// is the other half of that contract, collapsing the resulting
/// `Outcome<Result<R, Interrupted>>` into a plain `Outcome<R>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("task was interrupted")
    }
}

impl std::error::Error for Interrupted {}

impl<R> Outcome<Result<R, Interrupted>> {
    /// Collapses a task body's `Result<R, Interrupted>` output into
    /// `Outcome<R>`, folding a `?`-propagated [`Interrupted`] into
    /// [`Outcome::Interrupted`] instead of leaving it wrapped inside
    /// [`Outcome::Value`].
    pub fn flatten_interrupted(self) -> Outcome<R> {
        match self {
            Outcome::Value(Ok(value)) => Outcome::Value(value),
            Outcome::Value(Err(Interrupted)) => Outcome::Interrupted,
            Outcome::Panicked(payload) => Outcome::Panicked(payload),
            Outcome::Interrupted => Outcome::Interrupted,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Outcome::Panicked(_) => f.debug_tuple("Panicked").finish(),
            Outcome::Interrupted => f.write_str("Interrupted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        let v: Outcome<i32> = Outcome::Value(1);
        assert!(v.has_value());
        assert!(!v.has_exception());
        assert!(!v.is_interrupted());

        let i: Outcome<i32> = Outcome::Interrupted;
        assert!(i.is_interrupted());
        assert!(!i.has_value());
    }

    #[test]
    #[should_panic(expected = "interrupted")]
    fn into_value_panics_on_interruption() {
        let o: Outcome<i32> = Outcome::Interrupted;
        let _ = o.into_value();
    }

    #[test]
    fn flatten_interrupted_collapses_err_variant() {
        let ok: Outcome<Result<i32, Interrupted>> = Outcome::Value(Ok(3));
        assert_eq!(ok.flatten_interrupted().into_value(), 3);

        let cancelled: Outcome<Result<i32, Interrupted>> = Outcome::Value(Err(Interrupted));
        assert!(cancelled.flatten_interrupted().is_interrupted());

        let already: Outcome<Result<i32, Interrupted>> = Outcome::Interrupted;
        assert!(already.flatten_interrupted().is_interrupted());
    }
}
