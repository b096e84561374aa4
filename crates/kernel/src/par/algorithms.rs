//! Parallel algorithms over the worker pool.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use arrayvec::ArrayVec;
use rayon::prelude::*;

use super::control::{install, num_threads};
use crate::util::divide_up;

/// Work-splitting policy for the batch operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Partitioner {
    /// Adaptive splitting: blocks subdivide while workers are idle.
    #[default]
    Auto,
    /// Fixed grain of `divide_up(n, num_threads())` elements per block.
    Static,
}

impl Partitioner {
    fn grain(self, len: usize) -> usize {
        match self {
            Partitioner::Auto => 1,
            Partitioner::Static => divide_up(len.max(1), num_threads()),
        }
    }
}

/// Raw pointer wrapper for scatter writes to disjoint slots.
///
/// Every use must guarantee that concurrent writers target disjoint
/// indices and that the allocation outlives the parallel call.
#[derive(Clone, Copy)]
pub(crate) struct SendPtr<T>(pub(crate) *mut T);

unsafe impl<T: Send> Send for SendPtr<T> {}
unsafe impl<T: Send> Sync for SendPtr<T> {}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// Batch operations.

/// Apply `func` to every element of `range`, exactly once, in parallel.
///
/// Visit order is unspecified. Lazy adapters (filter, map, zip, flatten)
/// over a random-access base are split block-wise on the base with the
/// adapter re-applied inside each worker, so views parallelize without
/// being collected first.
pub fn for_each<I, F>(range: I, func: F)
where
    I: IntoParallelIterator,
    F: Fn(I::Item) + Sync + Send,
{
    let iter = range.into_par_iter();
    install(|| iter.for_each(func));
}

/// [`for_each`] with an explicit work-splitting policy.
pub fn for_each_with<I, F>(partitioner: Partitioner, range: I, func: F)
where
    I: IntoParallelIterator,
    I::Iter: IndexedParallelIterator,
    F: Fn(I::Item) + Sync + Send,
{
    let iter = range.into_par_iter();
    let grain = partitioner.grain(iter.len());
    install(move || iter.with_min_len(grain).for_each(func));
}

/// Contiguous block partition of `[0, len)` into `num_threads()` blocks.
///
/// Block `k` covers `[k*q + min(k, r), (k+1)*q + min(k+1, r))` with
/// `q = len / T` and `r = len % T`: the `r` leading blocks get one extra
/// element. The partition is a function of `(len, T)` only.
pub fn deterministic_blocks(len: usize) -> Vec<Range<usize>> {
    let count = num_threads();
    let quotient = len / count;
    let remainder = len % count;
    (0..count)
        .map(|k| {
            let first = k * quotient + k.min(remainder);
            let last = (k + 1) * quotient + (k + 1).min(remainder);
            first..last
        })
        .collect()
}

/// Run `func` once per block of the deterministic partition, in parallel.
///
/// `func` receives the block's index range and the zero-based block index.
pub fn deterministic_for_each_range<F>(len: usize, func: F)
where
    F: Fn(Range<usize>, usize) + Sync + Send,
{
    let blocks = deterministic_blocks(len);
    install(|| {
        blocks
            .into_par_iter()
            .enumerate()
            .for_each(|(thread_index, block)| func(block, thread_index));
    });
}

/// Apply `func` to every element under the deterministic block partition.
///
/// The second argument of `func` is the index of the block (and of the
/// worker slot) the element belongs to; elements of one block are visited
/// sequentially in order.
pub fn deterministic_for_each<T, F>(items: &[T], func: F)
where
    T: Sync,
    F: Fn(&T, usize) + Sync + Send,
{
    deterministic_for_each_range(items.len(), |block, thread_index| {
        for item in &items[block] {
            func(item, thread_index);
        }
    });
}

/// Mutable variant of [`deterministic_for_each`].
pub fn deterministic_for_each_mut<T, F>(items: &mut [T], func: F)
where
    T: Send,
    F: Fn(&mut T, usize) + Sync + Send,
{
    let count = num_threads();
    let quotient = items.len() / count;
    let remainder = items.len() % count;
    // The leading `remainder` blocks carry one extra element; empty
    // trailing blocks are simply absent.
    let (lead, tail) = items.split_at_mut(remainder * (quotient + 1));
    let blocks: Vec<&mut [T]> = lead
        .chunks_mut(quotient + 1)
        .chain(tail.chunks_mut(quotient.max(1)))
        .collect();
    install(|| {
        blocks
            .into_par_iter()
            .enumerate()
            .for_each(|(thread_index, block)| {
                for item in block {
                    func(item, thread_index);
                }
            });
    });
}

/// Iterate a sequence of inner ranges chunk by chunk.
///
/// Outer chunks of `num_threads()` inner ranges run in parallel, each
/// inner range sequentially on one worker, so the inner ranges of a chunk
/// never share a worker.
pub fn block_for_each<O, F>(range: O, func: F)
where
    O: IntoIterator,
    O::Item: IntoIterator + Send,
    F: Fn(<O::Item as IntoIterator>::Item) + Sync + Send,
{
    let count = num_threads();
    let mut outer = range.into_iter();
    loop {
        let chunk: Vec<O::Item> = outer.by_ref().take(count).collect();
        if chunk.is_empty() {
            break;
        }
        install(|| {
            chunk.into_par_iter().for_each(|inner| {
                for item in inner {
                    func(item);
                }
            });
        });
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// Fold operations.

/// Parallel fold.
///
/// Each block is reduced sequentially with `func` starting from a clone of
/// `init`; block results merge with `combine`. `combine` must be
/// associative with `init` as its identity; the merge order is
/// unspecified, so a non-commutative `combine` gives a nondeterministic
/// result.
pub fn fold<I, R, F, C>(range: I, init: R, func: F, combine: C) -> R
where
    I: IntoParallelIterator,
    R: Clone + Send + Sync,
    F: Fn(R, I::Item) -> R + Sync + Send,
    C: Fn(R, R) -> R + Sync + Send,
{
    let iter = range.into_par_iter();
    install(|| {
        iter.fold(|| init.clone(), &func)
            .reduce(|| init.clone(), &combine)
    })
}

/// [`fold`] with an explicit work-splitting policy.
pub fn fold_with<I, R, F, C>(partitioner: Partitioner, range: I, init: R, func: F, combine: C) -> R
where
    I: IntoParallelIterator,
    I::Iter: IndexedParallelIterator,
    R: Clone + Send + Sync,
    F: Fn(R, I::Item) -> R + Sync + Send,
    C: Fn(R, R) -> R + Sync + Send,
{
    let iter = range.into_par_iter();
    let grain = partitioner.grain(iter.len());
    install(move || {
        iter.with_min_len(grain)
            .fold(|| init.clone(), &func)
            .reduce(|| init.clone(), &combine)
    })
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// Copy operations.

/// Parallel copy-if that does not preserve element order.
///
/// Elements satisfying `pred` are written to the front of `out`; the
/// number written is returned. Workers filter into a fixed 64-element
/// staging buffer and reserve output slots with a single fetch-and-add
/// per flushed buffer, bounding shared-counter traffic to one atomic
/// operation per 64 elements.
pub fn unstable_copy_if<T, P>(items: &[T], out: &mut [T], pred: P) -> usize
where
    T: Copy + Send + Sync,
    P: Fn(&T) -> bool + Sync + Send,
{
    const STAGING_CAP: usize = 64;
    assert!(
        out.len() >= items.len(),
        "output must have room for every element"
    );

    let next = AtomicUsize::new(0);
    let out_ptr = SendPtr(out.as_mut_ptr());
    install(|| {
        items.par_chunks(STAGING_CAP).for_each(|chunk| {
            let out_ptr = out_ptr;
            let mut staging = ArrayVec::<T, STAGING_CAP>::new();
            staging.extend(chunk.iter().copied().filter(|item| pred(item)));
            if staging.is_empty() {
                return;
            }
            let start = next.fetch_add(staging.len(), Ordering::Relaxed);
            // SAFETY: the fetch-and-add reserves `staging.len()` slots
            // starting at `start` exclusively for this worker, and the
            // total accepted count never exceeds `out.len()`.
            unsafe {
                std::ptr::copy_nonoverlapping(staging.as_ptr(), out_ptr.0.add(start), staging.len());
            }
        });
    });
    next.into_inner()
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// Transformation operations.

/// Parallel map: `out[i] = func(range[i])` for every position.
pub fn transform<I, U, F>(range: I, out: &mut [U], func: F)
where
    I: IntoParallelIterator,
    I::Iter: IndexedParallelIterator,
    U: Send,
    F: Fn(I::Item) -> U + Sync + Send,
{
    let iter = range.into_par_iter();
    assert_eq!(iter.len(), out.len(), "output length must match the input");
    install(|| {
        out.par_iter_mut()
            .zip(iter)
            .for_each(|(slot, item)| *slot = func(item));
    });
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// Sorting operations.

/// Parallel unstable sort.
pub fn sort<T: Ord + Send>(items: &mut [T]) {
    install(|| items.par_sort_unstable());
}

/// Parallel unstable sort by a projection key.
pub fn sort_by_key<T, K, F>(items: &mut [T], proj: F)
where
    T: Send,
    K: Ord + Send,
    F: Fn(&T) -> K + Sync + Send,
{
    install(|| items.par_sort_unstable_by_key(proj));
}
