//! Fixed-size worker pool.

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::PoolError;

/// A fixed set of worker threads that runs one task closure on every worker.
///
/// The pool keeps no state between calls and may be shared by several
/// concurrent callers.
pub struct WorkerPool {
    pool: ThreadPool,
    num_threads: usize,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Result<Self, PoolError> {
        if num_threads == 0 {
            return Err(PoolError::InvalidThreadCount(num_threads));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("horizon-worker-{i}"))
            .build()?;
        debug!(num_threads, "Worker pool started");
        Ok(Self { pool, num_threads })
    }

    pub const fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Run `task(worker_id)` for `worker_id in 0..num_tasks` on the pool and
    /// block until all of them have returned.
    ///
    /// A panicking task is propagated to the caller.
    pub fn run_parallel<F>(&self, task: F, num_tasks: usize)
    where
        F: Fn(usize) + Sync,
    {
        let task = &task;
        self.pool.scope(|s| {
            for worker_id in 0..num_tasks {
                s.spawn(move |_| task(worker_id));
            }
        });
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.num_threads)
            .finish_non_exhaustive()
    }
}
