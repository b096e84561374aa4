//! Append-only bucketed storage with flat layout.

use rayon::prelude::*;

use crate::par;
use crate::par::SendPtr;

/// A vector of vectors stored as one flat value array plus bucket offsets.
///
/// The layout is the compressed-row idiom: bucket `i` is
/// `values[offsets[i]..offsets[i + 1]]`. Buckets are appended in order and
/// never modified afterwards, except through a full reassignment.
#[derive(Debug, Clone)]
pub struct Multivector<T> {
    offsets: Vec<usize>,
    values: Vec<T>,
}

impl<T> Multivector<T> {
    /// Empty storage with no buckets.
    pub fn new() -> Self {
        Self { offsets: vec![0], values: Vec::new() }
    }

    /// Remove every bucket.
    pub fn clear(&mut self) {
        self.offsets.truncate(1);
        self.values.clear();
    }

    /// Number of buckets.
    pub fn num_buckets(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of stored values.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Append one bucket holding the elements of `bucket`.
    pub fn append_bucket<I>(&mut self, bucket: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.values.extend(bucket);
        self.offsets.push(self.values.len());
    }

    /// The contents of bucket `index`.
    pub fn bucket(&self, index: usize) -> &[T] {
        &self.values[self.offsets[index]..self.offsets[index + 1]]
    }

    /// All buckets in order.
    pub fn buckets(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.offsets
            .windows(2)
            .map(move |pair| &self.values[pair[0]..pair[1]])
    }

    /// Per-bucket sizes.
    pub fn bucket_sizes(&self) -> Vec<usize> {
        self.offsets.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }

    /// `(bucket, value)` for every stored value.
    pub fn edges(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.buckets()
            .enumerate()
            .flat_map(|(index, bucket)| bucket.iter().map(move |value| (index, value)))
    }
}

impl<T: Copy + Default + Send + Sync> Multivector<T> {
    /// Rebuild as `num_buckets` buckets from keyed pairs, in parallel.
    ///
    /// Runs two passes over the deterministic block partition: per-block
    /// bucket histograms, an exclusive prefix over `(bucket, block)`, and a
    /// scatter through per-block cursors. Within a bucket, values appear
    /// in block order then input order, so repeated calls with the same
    /// input reproduce the exact same storage.
    pub fn assign_pairs_par_wide<K>(&mut self, num_buckets: usize, pairs: &[T], key: K)
    where
        K: Fn(&T) -> usize + Sync + Send,
    {
        let blocks = par::deterministic_blocks(pairs.len());

        // --- 1. Count keys per (block, bucket) ---
        let mut histograms: Vec<Vec<usize>> = vec![Vec::new(); blocks.len()];
        par::transform(&blocks, &mut histograms, |block| {
            let mut histogram = vec![0usize; num_buckets];
            for pair in &pairs[block.clone()] {
                histogram[key(pair)] += 1;
            }
            histogram
        });

        // --- 2. Exclusive prefix: bucket offsets and per-block cursors ---
        self.offsets.clear();
        self.offsets.resize(num_buckets + 1, 0);
        let mut running = 0;
        for bucket in 0..num_buckets {
            self.offsets[bucket] = running;
            for histogram in &mut histograms {
                let count = histogram[bucket];
                histogram[bucket] = running;
                running += count;
            }
        }
        self.offsets[num_buckets] = running;
        debug_assert_eq!(running, pairs.len());

        // --- 3. Scatter values through the cursors ---
        self.values.clear();
        self.values.resize(running, T::default());
        let values = SendPtr(self.values.as_mut_ptr());
        par::for_each(
            histograms.par_iter_mut().zip(blocks.par_iter()),
            |(cursors, block)| {
                let values = values;
                for pair in &pairs[block.clone()] {
                    let slot = &mut cursors[key(pair)];
                    // SAFETY: cursor ranges of distinct (block, bucket)
                    // pairs are disjoint by the prefix construction, and
                    // every slot below `running` is written exactly once.
                    unsafe { *values.0.add(*slot) = *pair };
                    *slot += 1;
                }
            },
        );
    }
}

impl<T> Default for Multivector<T> {
    fn default() -> Self {
        Self::new()
    }
}
