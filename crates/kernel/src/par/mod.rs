//! Thread-pool-backed parallel algorithms.
//!
//! All operations run on a crate-owned worker pool configured with
//! [`set_num_threads`]. Calls block until every work item has finished;
//! the pool barrier on return makes writes from one parallel call visible
//! to all workers of the next. A panic raised by user code inside a
//! parallel call propagates out of it exactly once; remaining scheduled
//! work is discarded.

mod algorithms;
mod control;

pub use algorithms::{
    block_for_each, deterministic_blocks, deterministic_for_each, deterministic_for_each_mut,
    deterministic_for_each_range, fold, fold_with, for_each, for_each_with, sort, sort_by_key,
    transform, unstable_copy_if, Partitioner,
};
pub use control::{num_threads, set_num_threads};

pub(crate) use algorithms::SendPtr;
pub(crate) use control::install;
