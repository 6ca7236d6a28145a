//! [`TaskPool`], the owner of a [`GlobalExecutor`] and its worker threads.
//!
//! Near-verbatim port of the teacher's `task_pool.rs` thread-spawning and
//! shutdown machinery (the panic-resumes-the-run-loop worker body in
//! particular), minus the `Scope`/`LocalExecutor` non-`'static` scoped-spawn
//! machinery: nothing in this system spawns non-`'static` work, so that half
//! of the teacher's file has no counterpart here.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::task::Poll;
use std::thread::{self, JoinHandle};

use atomic_waker::AtomicWaker;

use crate::callable;
use crate::config::{PoolSize, StackSize, MINIMUM_STACK_SIZE};
use crate::error::{Interrupted, Outcome};
use crate::global_executor::GlobalExecutor;
use crate::handle::Handle;
use crate::queue::{Prioritized, UnboundedPriority, WorkQueue};
use crate::task::Task;

/// Builds a [`TaskPool`]. Defaults to one worker per available hardware
/// thread and the minimum accepted stack size, mirroring the teacher's
/// `TaskPoolBuilder` defaults.
pub struct TaskPoolBuilder {
    pool_size: PoolSize,
    stack_size: StackSize,
    thread_name: String,
}

impl TaskPoolBuilder {
    pub fn new() -> Self {
        let default_size = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        TaskPoolBuilder {
            pool_size: PoolSize::new(default_size).expect("available_parallelism() is always >= 1"),
            stack_size: StackSize::new(MINIMUM_STACK_SIZE).expect("MINIMUM_STACK_SIZE is always valid"),
            thread_name: "taskwell-worker".to_string(),
        }
    }

    pub fn pool_size(mut self, pool_size: PoolSize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn stack_size(mut self, stack_size: StackSize) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn build(self) -> TaskPool {
        TaskPool::new_internal(self)
    }
}

impl Default for TaskPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed-size worker pool with a tri-level work-stealing scheduler.
pub struct TaskPool {
    executor: Arc<GlobalExecutor<'static>>,
    threads: Vec<JoinHandle<()>>,
    shutdown_tx: async_channel::Sender<()>,
    interrupts: Mutex<Vec<Weak<AtomicBool>>>,
    priority_gate: Arc<PrioritySemaphore>,
}

impl TaskPool {
    fn new_internal(builder: TaskPoolBuilder) -> TaskPool {
        let pool_size = builder.pool_size.get();
        let executor: Arc<GlobalExecutor<'static>> = Arc::new(GlobalExecutor::new(pool_size));
        let (shutdown_tx, shutdown_rx) = async_channel::unbounded::<()>();
        // Capacity `pool_size`, not a fixed `1`: the gate only fixes the
        // relative *start* order among priority-submitted bodies contending
        // for a permit at the same moment. It must not cap how many of them
        // run at once, or priority-attributed work would lose the pool's
        // parallelism entirely.
        let priority_gate = Arc::new(PrioritySemaphore::new(pool_size));

        let threads = (0..pool_size)
            .map(|index| {
                let executor = Arc::clone(&executor);
                let shutdown_rx = shutdown_rx.clone();
                thread::Builder::new()
                    .name(format!("{}-{index}", builder.thread_name))
                    .stack_size(builder.stack_size.get())
                    .spawn(move || {
                        executor.bind_local_worker();
                        // A panic escaping the run loop itself (as opposed to
                        // a task body's panic, which `callable::run_callable`
                        // already captures) is a scheduler bug; resume the
                        // loop rather than leaving the pool one worker short,
                        // exactly as the teacher's worker body does.
                        loop {
                            let result = catch_unwind(AssertUnwindSafe(|| {
                                futures_lite::future::block_on(executor.run(shutdown_rx.recv()))
                            }));
                            if result.is_ok() {
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn pool worker thread")
            })
            .collect();

        TaskPool { executor, threads, shutdown_tx, interrupts: Mutex::new(Vec::new()), priority_gate }
    }

    /// Number of worker threads in this pool.
    pub fn worker_num(&self) -> usize {
        self.executor.worker_num()
    }

    /// Submits `f` to the pool. The closure is invoked synchronously (to
    /// produce the future); the future itself runs on the pool's workers.
    pub fn submit<F, Fut, T>(&self, f: F) -> Handle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let flag = Arc::new(AtomicBool::new(false));
        self.register_interrupt(&flag);
        let wrapped = callable::run_callable(f(), Arc::clone(&flag));
        let task = self.executor.spawn(wrapped);
        Handle::new(Task(task), flag)
    }

    /// Submits a cancellable `f`: its body returns `Result<T, Interrupted>`
    /// and ends its natural loop with `this_task::checkpoint().await?`. The
    /// resulting `Outcome<Result<T, Interrupted>>` is flattened into
    /// `Outcome<T>` before the handle ever surfaces it, so
    /// `Handle::get()` reports `Outcome::Interrupted` directly rather than
    /// `Outcome::Value(Err(Interrupted))`.
    pub fn submit_cancellable<F, Fut, T>(&self, f: F) -> Handle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Interrupted>> + Send + 'static,
        T: Send + 'static,
    {
        let flag = Arc::new(AtomicBool::new(false));
        self.register_interrupt(&flag);
        let body_flag = Arc::clone(&flag);
        let wrapped = async move { callable::run_callable(f(), body_flag).await.flatten_interrupted() };
        let task = self.executor.spawn(wrapped);
        Handle::new(Task(task), flag)
    }

    /// Submits `f` with a priority: among priority-submitted tasks that are
    /// simultaneously waiting to start, the smallest `priority` value starts
    /// first (the same "smallest sorts first" convention as
    /// [`crate::queue::Prioritized`]). This only reorders *when a body starts
    /// running* relative to other priority submissions contending for a free
    /// gate permit at that moment — it does not cap concurrency below the
    /// pool's worker count, so priority-submitted bodies still run as many
    /// at once as plain [`TaskPool::submit`] ones do. Plain `submit` tasks
    /// are not subject to this ordering at all.
    ///
    /// Fixes the priority type to `i64` — a single pool's gate needs one
    /// homogeneous priority type shared across every call, unlike the
    /// freestanding, fully generic [`crate::queue::UnboundedPriority`].
    pub fn submit_with_priority<F, Fut, T>(&self, priority: i64, f: F) -> Handle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let flag = Arc::new(AtomicBool::new(false));
        self.register_interrupt(&flag);
        let body_flag = Arc::clone(&flag);
        let gate = Arc::clone(&self.priority_gate);
        let wrapped = async move {
            gate.acquire(priority).await;
            let outcome = callable::run_callable(f(), body_flag).await;
            gate.release();
            outcome
        };
        let task = self.executor.spawn(wrapped);
        Handle::new(Task(task), flag)
    }

    /// Deactivates submission and waits for every worker thread to finish
    /// its run loop after already-queued work drains normally.
    pub fn shutdown(self) {
        self.shutdown_tx.close();
        for thread in self.threads {
            let _ = thread.join();
        }
    }

    /// Sets every live task's interruption flag, then runs every
    /// still-queued `Runnable` to completion — each one now resolves
    /// immediately to `Outcome::Interrupted` via `callable::run_callable`'s
    /// before-start check — before shutting down as [`TaskPool::shutdown`]
    /// does.
    pub fn shutdown_now(self) {
        let flags: Vec<_> = self.interrupts.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect();
        for weak in flags {
            if let Some(flag) = weak.upgrade() {
                flag.store(true, Ordering::Release);
            }
        }
        self.executor.drain_and_run_all();
        self.shutdown();
    }

    fn register_interrupt(&self, flag: &Arc<AtomicBool>) {
        let mut interrupts = self.interrupts.lock().unwrap_or_else(|e| e.into_inner());
        interrupts.retain(|weak| weak.strong_count() > 0);
        interrupts.push(Arc::downgrade(flag));
    }
}

// -----------------------------------------------------------------------------
// Priority dispatch gate

struct Waiter {
    waker: AtomicWaker,
    granted: AtomicBool,
}

/// A counting semaphore whose waiters are released in priority order rather
/// than FIFO, used by [`TaskPool::submit_with_priority`] to decide which
/// queued task starts running its body next. Plain CAS fast path for the
/// uncontended case, falling back to parking the waiter in a
/// [`crate::queue::UnboundedPriority`] — the same priority store §4.2's
/// standalone queue variant uses, reused here for exactly the ordering job
/// it already does — with `atomic-waker` standing in for a blocking
/// `Condvar` wait since this side is async.
///
/// Built with capacity equal to the pool's worker count, not a fixed `1`:
/// the heap only decides *which waiter is released next* when more permits
/// are requested than are available at that instant, it never reduces how
/// many permits exist.
struct PrioritySemaphore {
    available: AtomicUsize,
    waiters: UnboundedPriority<Arc<Waiter>, i64>,
}

impl PrioritySemaphore {
    fn new(capacity: usize) -> Self {
        PrioritySemaphore { available: AtomicUsize::new(capacity), waiters: UnboundedPriority::new() }
    }

    fn try_claim(&self) -> bool {
        let mut current = self.available.load(Ordering::Acquire);
        while current > 0 {
            match self.available.compare_exchange_weak(current, current - 1, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
        false
    }

    async fn acquire(&self, priority: i64) {
        if self.try_claim() {
            return;
        }

        let waiter = Arc::new(Waiter { waker: AtomicWaker::new(), granted: AtomicBool::new(false) });
        let mut queued = false;

        futures_lite::future::poll_fn(|cx| {
            if waiter.granted.load(Ordering::Acquire) {
                return Poll::Ready(());
            }
            waiter.waker.register(cx.waker());
            if waiter.granted.load(Ordering::Acquire) {
                return Poll::Ready(());
            }
            if !queued {
                self.waiters.put(Prioritized::new(Arc::clone(&waiter), priority)).expect("priority gate's waiter queue is never deactivated");
                queued = true;
            }
            Poll::Pending
        })
        .await
    }

    fn release(&self) {
        match self.waiters.try_take() {
            Some(next) => {
                next.item.granted.store(true, Ordering::Release);
                next.item.waker.wake();
            }
            None => {
                self.available.fetch_add(1, Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering as AtomicOrdering;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn submit_runs_and_reports_value() {
        let pool = TaskPoolBuilder::new().pool_size(PoolSize::new(2).unwrap()).build();
        let handle = pool.submit(|| async { 2 + 2 });
        assert_eq!(handle.get().into_value(), 4);
        pool.shutdown();
    }

    #[test]
    fn submit_captures_panics() {
        let pool = TaskPoolBuilder::new().pool_size(PoolSize::new(2).unwrap()).build();
        let handle = pool.submit(|| async {
            panic!("deliberate");
            #[allow(unreachable_code)]
            ()
        });
        assert!(handle.get().has_exception());
        pool.shutdown();
    }

    #[test]
    fn submit_cancellable_collapses_interrupted() {
        let pool = TaskPoolBuilder::new().pool_size(PoolSize::new(1).unwrap()).build();
        let handle = pool.submit_cancellable(|| async {
            loop {
                crate::this_task::checkpoint().await?;
            }
            #[allow(unreachable_code)]
            Ok(())
        });
        handle.interrupt();
        let outcome = handle.get();
        assert!(outcome.is_interrupted());
        pool.shutdown();
    }

    #[test]
    fn submit_with_priority_runs_highest_priority_first() {
        // Single worker, so at most one priority body runs at a time. "low"
        // is submitted first and therefore wins the gate's uncontended fast
        // path regardless of its priority value; it then yields several
        // times while still holding the gate, giving the worker a chance to
        // poll "mid" and "high" (submitted in that, deliberately
        // priority-inverted, order) so both genuinely register as waiters
        // on the heap before "low" releases. The final order between "mid"
        // and "high" then proves real priority-based reordering rather than
        // coincidental FIFO order.
        let pool = TaskPoolBuilder::new().pool_size(PoolSize::new(1).unwrap()).build();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for (priority, label) in [(10, "low"), (5, "mid"), (1, "high")] {
            let order = Arc::clone(&order);
            handles.push(pool.submit_with_priority(priority, move || async move {
                if label == "low" {
                    for _ in 0..8 {
                        crate::this_task::yield_now().await;
                    }
                }
                order.lock().unwrap_or_else(|e| e.into_inner()).push(label);
            }));
        }

        for handle in handles {
            handle.get();
        }

        let recorded = order.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(recorded, vec!["low", "high", "mid"]);
    }

    #[test]
    fn shutdown_now_interrupts_queued_work() {
        let pool = TaskPoolBuilder::new().pool_size(PoolSize::new(1).unwrap()).build();
        let ran = Arc::new(AtomicBool::new(false));
        let ran_in_task = Arc::clone(&ran);

        let blocker = pool.submit(|| async {
            std::thread::sleep(std::time::Duration::from_millis(50));
        });
        let queued = pool.submit(move || async move {
            ran_in_task.store(true, AtomicOrdering::Release);
        });

        pool.shutdown_now();
        let _ = blocker.try_get();
        assert!(queued.try_get().map(|o| o.is_interrupted()).unwrap_or(false) || !ran.load(AtomicOrdering::Acquire));
    }
}
