//! Worker-pool control.
//!
//! The pool is a process-wide resource: configure it once before the first
//! parallel call. Reconfiguring between parallel calls is allowed;
//! reconfiguring while a parallel call is in flight is a usage error.

use std::sync::{Arc, OnceLock, RwLock};

use rayon::ThreadPool;

fn build_pool(num_threads: usize) -> Arc<ThreadPool> {
    Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|index| format!("kernel-worker-{index}"))
            .build()
            .expect("failed to build the worker pool"),
    )
}

fn pool_slot() -> &'static RwLock<Arc<ThreadPool>> {
    static POOL: OnceLock<RwLock<Arc<ThreadPool>>> = OnceLock::new();
    // `num_threads = 0` lets the pool default to the logical core count.
    POOL.get_or_init(|| RwLock::new(build_pool(0)))
}

fn lock_read() -> Arc<ThreadPool> {
    pool_slot().read().expect("worker pool lock poisoned").clone()
}

/// Configure the worker pool to `num_threads` threads.
///
/// A no-op when the pool already has the requested size.
pub fn set_num_threads(num_threads: usize) {
    assert!(num_threads > 0, "thread count must be positive");
    if lock_read().current_num_threads() == num_threads {
        return;
    }
    *pool_slot().write().expect("worker pool lock poisoned") = build_pool(num_threads);
}

/// The configured worker thread count.
pub fn num_threads() -> usize {
    lock_read().current_num_threads()
}

/// Run `op` inside the worker pool and block until it returns.
pub(crate) fn install<R, F>(op: F) -> R
where
    R: Send,
    F: FnOnce() -> R + Send,
{
    lock_read().install(op)
}
