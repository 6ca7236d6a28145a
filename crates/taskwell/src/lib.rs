//! A cooperative work-stealing task pool with suspendable task contexts.
//!
//! [`TaskPool`] owns a fixed set of worker threads and a tri-level
//! work-stealing scheduler (per-worker local seat, shared global queue,
//! randomized steal from another worker's seat) built over Rust's native
//! `Future` rather than stackful coroutines. [`submit::own_thread`],
//! [`submit::new_thread`], and [`submit::fork`] cover the submission forms
//! that don't need a pool at all, or piggyback on one already running.
//! [`queue`] is a standalone set of FIFO/priority, bounded/unbounded work
//! queues usable independently of the pool.
//!
//! Every submission form returns a [`Handle`], which carries the task's
//! eventual [`Outcome`] (a value, a captured panic, or an interruption
//! sentinel) plus a cooperative interruption flag a task body can observe
//! via [`this_task::checkpoint`] or [`this_task::interruption_requested`].

mod callable;
mod config;
mod error;
mod global_executor;
mod handle;
mod pool;
pub mod queue;
mod submit;
mod task;
pub mod this_task;
mod xor_shift;

pub use config::{HighWatermark, LowWatermark, PoolSize, StackSize, Watermarks, MINIMUM_STACK_SIZE};
pub use error::{ConfigError, Interrupted, Outcome, TaskRejected};
pub use handle::Handle;
pub use pool::{TaskPool, TaskPoolBuilder};
pub use submit::{fork, new_thread, own_thread};
