//! Samplers that decide which sample indices form each batch, and in what
//! order. Length-aware variants group samples of similar length together to
//! cut padding overhead.

use crate::bucketing::{assign_to_buckets, bucket_stats};
use crate::error::{Error, Result};
use crate::length::{format_rows, LengthTable};
use crate::scheme::{BucketKey, BucketScheme, ConstWidthBucket};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::warn;

/// A `Sampler` defines the strategy for how to iterate and draw index batches
/// from a dataset.
///
/// # Methods
/// - `iter(epoch)`: returns the batch sequence for that epoch. Samplers that
///   shuffle derive their RNG from the base seed together with `epoch`, so a
///   given `(seed, epoch)` pair always reproduces the same pass, and the
///   constructed state is never mutated by iteration.
/// - `len()`: the number of steps one full pass yields.
///
/// Implementations must be `Send + Sync` so the same sampler instance can be
/// safely shared across consumer threads.
pub trait Sampler: Send + Sync {
    type Item: Send + Sync;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Self::Item> + Send + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ============================================================================
/// Sorts all indices once by an external key and iterates them sequentially.
///
/// # Arguments:
/// - `sort_keys`: One key per sample (e.g. sequence length).
/// - `descending`: Whether the longest/largest keys come first.
///
/// The sort is stable, so samples with equal keys keep their original order.
/// Iteration is identical for every epoch.
///
/// # Example
/// ```ignore
/// let sampler = SortedSampler::new(&[7, 31, 12], true)?;
/// let order: Vec<_> = sampler.iter(0).collect();
/// assert_eq!(order, vec![1, 2, 0]);
/// ```
#[derive(Debug, Clone)]
pub struct SortedSampler {
    sorted_ids: Vec<usize>,
}

impl SortedSampler {
    pub fn new<K: Ord>(sort_keys: &[K], descending: bool) -> Result<Self> {
        if sort_keys.is_empty() {
            return Err(Error::config("sort_keys must not be empty"));
        }
        let mut sorted_ids: Vec<usize> = (0..sort_keys.len()).collect();
        if descending {
            sorted_ids.sort_by(|&a, &b| sort_keys[b].cmp(&sort_keys[a]));
        } else {
            sorted_ids.sort_by(|&a, &b| sort_keys[a].cmp(&sort_keys[b]));
        }
        Ok(Self { sorted_ids })
    }
}

impl Sampler for SortedSampler {
    type Item = usize;

    fn iter(&self, _epoch: usize) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        Box::new(self.sorted_ids.iter().copied())
    }

    fn len(&self) -> usize {
        self.sorted_ids.len()
    }
}

/// ============================================================================
/// Batches drawn from locally sorted windows of the index sequence.
///
/// Per pass: indices are optionally shuffled, partitioned into windows of
/// `mult * batch_size`, each window is sorted independently by its key and
/// sliced into `batch_size` chunks, and the chunk order inside a window is
/// shuffled again when shuffling is on. This trades perfect global ordering
/// for O(window) instead of O(N) sorting memory while still grouping similar
/// lengths together.
///
/// # Arguments:
/// - `sort_keys`: One key per sample, usually its length.
/// - `batch_size`: Indices per final batch. Must be >= 1.
/// - `mult`: Window size multiplier. Must be >= 1; larger windows sort more
///   globally at the cost of memory.
/// - `descending`: Sort order within a window.
/// - `shuffle`: Whether to shuffle the index order and the chunk order.
/// - `base_seed`: Base RNG seed; the pass RNG is derived from
///   `base_seed + epoch` and each window's chunk shuffle from
///   `base_seed + epoch + window_id`.
pub struct SortedBucketSampler<K> {
    sort_keys: Vec<K>,
    batch_size: usize,
    mult: usize,
    descending: bool,
    shuffle: bool,
    base_seed: u64,
}

impl<K: Ord + Send + Sync> SortedBucketSampler<K> {
    pub fn new(
        sort_keys: Vec<K>,
        batch_size: usize,
        mult: usize,
        descending: bool,
        shuffle: bool,
        base_seed: u64,
    ) -> Result<Self> {
        if sort_keys.is_empty() {
            return Err(Error::config("sort_keys must not be empty"));
        }
        if batch_size == 0 {
            return Err(Error::config("batch_size must be larger than 0"));
        }
        if mult == 0 {
            return Err(Error::config("bucket size multiplier must be at least 1"));
        }
        Ok(Self {
            sort_keys,
            batch_size,
            mult,
            descending,
            shuffle,
            base_seed,
        })
    }
}

impl<K: Ord + Send + Sync> Sampler for SortedBucketSampler<K> {
    type Item = Vec<usize>;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = Vec<usize>> + Send + '_> {
        let mut sample_ids: Vec<usize> = (0..self.sort_keys.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64));
            sample_ids.shuffle(&mut rng);
        }

        let window_size = self.mult * self.batch_size;
        let windows: Vec<Vec<usize>> = sample_ids
            .chunks(window_size)
            .map(|window| window.to_vec())
            .collect();

        let batch_size = self.batch_size;
        let shuffle = self.shuffle;
        let base_seed = self.base_seed;
        Box::new(
            windows
                .into_iter()
                .enumerate()
                .flat_map(move |(window_id, mut window)| {
                    if self.descending {
                        window.sort_by(|&a, &b| self.sort_keys[b].cmp(&self.sort_keys[a]));
                    } else {
                        window.sort_by(|&a, &b| self.sort_keys[a].cmp(&self.sort_keys[b]));
                    }
                    let mut batches: Vec<Vec<usize>> = window
                        .chunks(batch_size)
                        .map(|chunk| chunk.to_vec())
                        .collect();
                    if shuffle && batches.len() > 1 {
                        let mut rng = StdRng::seed_from_u64(
                            base_seed
                                .wrapping_add(epoch as u64)
                                .wrapping_add(window_id as u64),
                        );
                        batches.shuffle(&mut rng);
                    }
                    batches.into_iter()
                }),
        )
    }

    fn len(&self) -> usize {
        self.sort_keys.len().div_ceil(self.batch_size)
    }
}

/// ============================================================================
/// One step of a [`FixedBucketSampler`] pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchIndices {
    /// The sample indices of one batch.
    Flat(Vec<usize>),
    /// Exactly `num_shards` aligned per-shard index lists.
    Sharded(Vec<Vec<usize>>),
}

impl BatchIndices {
    pub fn as_flat(&self) -> Option<&[usize]> {
        match self {
            BatchIndices::Flat(ids) => Some(ids),
            BatchIndices::Sharded(_) => None,
        }
    }

    pub fn as_shards(&self) -> Option<&[Vec<usize>]> {
        match self {
            BatchIndices::Flat(_) => None,
            BatchIndices::Sharded(shards) => Some(shards),
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    key: BucketKey,
    sample_ids: Vec<usize>,
    batch_size: usize,
}

const DEFAULT_NUM_BUCKETS: usize = 10;

/// Configuration for [`FixedBucketSampler`].
///
/// Example:
/// ```ignore
/// let config = FixedBucketSamplerConfig::builder()
///     .num_buckets(20)
///     .ratio(0.5)
///     .shuffle(true)
///     .seed(42)
///     .build();
/// ```
#[derive(Clone)]
pub struct FixedBucketSamplerConfig {
    /// Number of generated buckets (defaults to 10 if not specified).
    /// Ignored when `bucket_keys` is supplied.
    pub num_buckets: Option<usize>,
    /// Explicit bucket keys; generated by `scheme` when `None`.
    pub bucket_keys: Option<Vec<BucketKey>>,
    /// Ratio to scale up the batch size of shorter-sequence buckets.
    /// 0 keeps a uniform batch size.
    pub ratio: f64,
    /// Whether to shuffle the schedule and each bucket's samples every pass.
    pub shuffle: bool,
    /// Target a fixed token budget per batch instead of a fixed sequence
    /// count; `ratio` is ignored under this policy.
    pub use_average_length: bool,
    /// Number of aligned sub-batches per step (0 disables sharding).
    /// Typically the number of parallel consumers.
    pub num_shards: usize,
    /// Key generation scheme.
    pub scheme: Arc<dyn BucketScheme>,
    /// Base RNG seed for reproducible shuffling.
    pub seed: u64,
}

impl Default for FixedBucketSamplerConfig {
    fn default() -> Self {
        Self {
            num_buckets: None,
            bucket_keys: None,
            ratio: 0.0,
            shuffle: false,
            use_average_length: false,
            num_shards: 0,
            scheme: Arc::new(ConstWidthBucket),
            seed: 0,
        }
    }
}

impl FixedBucketSamplerConfig {
    pub fn builder() -> FixedBucketSamplerConfigBuilder {
        FixedBucketSamplerConfigBuilder::default()
    }
}

/// Builder for [`FixedBucketSamplerConfig`] with method chaining.
#[derive(Default)]
pub struct FixedBucketSamplerConfigBuilder {
    config: FixedBucketSamplerConfig,
}

impl FixedBucketSamplerConfigBuilder {
    /// Set the number of generated buckets.
    pub fn num_buckets(mut self, num_buckets: usize) -> Self {
        self.config.num_buckets = Some(num_buckets);
        self
    }

    /// Use explicit bucket keys instead of a generation scheme.
    pub fn bucket_keys(mut self, bucket_keys: Vec<BucketKey>) -> Self {
        self.config.bucket_keys = Some(bucket_keys);
        self
    }

    /// Convenience for scalar-length datasets: one key per value.
    pub fn scalar_bucket_keys(self, bucket_keys: Vec<i64>) -> Self {
        self.bucket_keys(bucket_keys.into_iter().map(|key| vec![key]).collect())
    }

    /// Set the short-bucket batch-size scaling ratio (must be >= 0).
    pub fn ratio(mut self, ratio: f64) -> Self {
        self.config.ratio = ratio;
        self
    }

    /// Set whether to shuffle every pass.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    /// Switch to the average-length (token budget) batch-size policy.
    pub fn use_average_length(mut self, use_average_length: bool) -> Self {
        self.config.use_average_length = use_average_length;
        self
    }

    /// Set the number of aligned sub-batches per step.
    pub fn num_shards(mut self, num_shards: usize) -> Self {
        self.config.num_shards = num_shards;
        self
    }

    /// Set the bucket key generation scheme.
    pub fn scheme(mut self, scheme: impl BucketScheme + 'static) -> Self {
        self.config.scheme = Arc::new(scheme);
        self
    }

    /// Set the base RNG seed for reproducible shuffling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> FixedBucketSamplerConfig {
        self.config
    }
}

/// ============================================================================
/// Assigns each sample to a fixed bucket based on its length and yields one
/// batch of same-bucket indices per step.
///
/// Bucket keys are either supplied explicitly or generated by a
/// [`BucketScheme`] from the observed length range, then sorted ascending and
/// deduplicated. Each sample lands in the dominating bucket with the least
/// padding slack; buckets that receive no samples are dropped with a warning.
/// The construction-time schedule walks buckets from the largest key down to
/// the smallest, slicing every bucket's sample list into consecutive chunks
/// of its batch size.
///
/// # Batch size policies
/// - Ratio/count (default): with `S_i` the bucket key (component sum for
///   tuple keys), `B_i = max(floor(max_j S_j / S_i * ratio * B), B)`. A ratio
///   above 0 gives shorter-sequence buckets proportionally larger batches;
///   ratio 0 keeps a uniform `B`.
/// - Average length (`use_average_length`): `B_i = max(floor(B / (mean_i +
///   std_i)), 1)`, so `B` acts as an approximate token budget per batch and
///   `ratio` is ignored.
///
/// # Sharding
/// With `num_shards > 0` every step yields exactly `num_shards` aligned
/// sub-batches. When the final window of schedule entries would run short,
/// its start is shifted backward over already-scheduled entries, reusing a
/// few samples rather than emitting a malformed step.
///
/// # Example
/// ```ignore
/// let lengths = LengthTable::from_scalars(vec![5, 5, 5, 15, 15])?;
/// let config = FixedBucketSamplerConfig::builder().num_buckets(2).build();
/// let sampler = FixedBucketSampler::new(lengths, 2, config)?;
/// println!("{}", sampler.stats());
/// for batch in sampler.iter(0) {
///     // batch is BatchIndices::Flat(vec![...])
/// }
/// ```
#[derive(Debug)]
pub struct FixedBucketSampler {
    num_samples: usize,
    buckets: Vec<Bucket>,
    batch_infos: Vec<(usize, usize)>,
    shuffle: bool,
    num_shards: usize,
    base_seed: u64,
}

impl FixedBucketSampler {
    pub fn new(
        lengths: LengthTable,
        batch_size: usize,
        config: FixedBucketSamplerConfig,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::config("batch_size must be larger than 0"));
        }
        if config.ratio < 0.0 || !config.ratio.is_finite() {
            return Err(Error::config(format!(
                "batch size scaling ratio cannot be negative, got {}",
                config.ratio
            )));
        }

        let bucket_keys = resolve_bucket_keys(&lengths, &config)?;
        let bucket_sample_ids = assign_to_buckets(&bucket_keys, &lengths)?;

        let unused_keys: Vec<BucketKey> = bucket_keys
            .iter()
            .zip(&bucket_sample_ids)
            .filter(|(_, sample_ids)| sample_ids.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        if !unused_keys.is_empty() {
            warn!(
                "some buckets are empty and will be removed, unused bucket keys: {}",
                format_rows(&unused_keys)
            );
        }
        let (kept_keys, kept_sample_ids): (Vec<BucketKey>, Vec<Vec<usize>>) = bucket_keys
            .into_iter()
            .zip(bucket_sample_ids)
            .filter(|(_, sample_ids)| !sample_ids.is_empty())
            .unzip();

        let bucket_batch_sizes = if config.use_average_length {
            if config.ratio > 0.0 {
                warn!(
                    "ratio={} is ignored when use_average_length is enabled",
                    config.ratio
                );
            }
            bucket_stats(&kept_sample_ids, &lengths)
                .iter()
                .map(|stats| ((batch_size as f64 / (stats.mean + stats.std)) as usize).max(1))
                .collect::<Vec<_>>()
        } else {
            let scale_up_keys: Vec<i64> =
                kept_keys.iter().map(|key| key.iter().sum()).collect();
            let max_scale_up_key = scale_up_keys
                .iter()
                .copied()
                .max()
                .expect("at least one bucket survives assignment");
            scale_up_keys
                .iter()
                .map(|&scale_up_key| {
                    let scaled = (max_scale_up_key as f64 / scale_up_key as f64
                        * config.ratio
                        * batch_size as f64) as usize;
                    scaled.max(batch_size)
                })
                .collect()
        };

        let buckets: Vec<Bucket> = kept_keys
            .into_iter()
            .zip(kept_sample_ids)
            .zip(bucket_batch_sizes)
            .map(|((key, sample_ids), batch_size)| Bucket {
                key,
                sample_ids,
                batch_size,
            })
            .collect();

        // Largest-key buckets are scheduled first.
        let mut batch_infos: Vec<(usize, usize)> = Vec::new();
        for bucket_id in (0..buckets.len()).rev() {
            let bucket = &buckets[bucket_id];
            let mut begin = 0;
            while begin < bucket.sample_ids.len() {
                batch_infos.push((bucket_id, begin));
                begin += bucket.batch_size;
            }
        }

        if config.num_shards > batch_infos.len() {
            return Err(Error::config(format!(
                "num_shards ({}) exceeds the number of scheduled batches ({})",
                config.num_shards,
                batch_infos.len()
            )));
        }

        Ok(Self {
            num_samples: lengths.num_samples(),
            buckets,
            batch_infos,
            shuffle: config.shuffle,
            num_shards: config.num_shards,
            base_seed: config.seed,
        })
    }

    /// Diagnostic summary of the bucketing outcome: sample and batch counts,
    /// surviving keys, and per-bucket sample counts and batch sizes.
    pub fn stats(&self) -> String {
        let keys: Vec<BucketKey> = self.buckets.iter().map(|b| b.key.clone()).collect();
        let counts: Vec<usize> = self.buckets.iter().map(|b| b.sample_ids.len()).collect();
        let batch_sizes: Vec<usize> = self.buckets.iter().map(|b| b.batch_size).collect();
        format!(
            "FixedBucketSampler:\n  sample_num={}, batch_num={}\n  key={}\n  cnt={:?}\n  batch_size={:?}",
            self.num_samples,
            self.batch_infos.len(),
            format_rows(&keys),
            counts,
            batch_sizes,
        )
    }
}

fn resolve_bucket_keys(
    lengths: &LengthTable,
    config: &FixedBucketSamplerConfig,
) -> Result<Vec<BucketKey>> {
    let mut keys = match &config.bucket_keys {
        Some(explicit) => {
            if let Some(num_buckets) = config.num_buckets {
                warn!(
                    "num_buckets={} is ignored because explicit bucket_keys were supplied",
                    num_buckets
                );
            }
            if explicit.is_empty() {
                return Err(Error::config("bucket_keys must not be empty"));
            }
            if let Some(bad) = explicit.iter().find(|key| key.len() != lengths.arity()) {
                return Err(Error::config(format!(
                    "bucket key {:?} has {} attributes, expected {}",
                    bad,
                    bad.len(),
                    lengths.arity()
                )));
            }
            explicit.clone()
        }
        None => {
            let num_buckets = config.num_buckets.unwrap_or(DEFAULT_NUM_BUCKETS);
            if num_buckets == 0 {
                return Err(Error::config("num_buckets must be larger than 0"));
            }
            config
                .scheme
                .bucket_keys(&lengths.max_lengths(), &lengths.min_lengths(), num_buckets)
        }
    };
    keys.sort();
    keys.dedup();
    Ok(keys)
}

impl Sampler for FixedBucketSampler {
    type Item = BatchIndices;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = BatchIndices> + Send + '_> {
        let mut batch_infos = self.batch_infos.clone();
        let mut sample_ids: Vec<Vec<usize>> = self
            .buckets
            .iter()
            .map(|bucket| bucket.sample_ids.clone())
            .collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.base_seed.wrapping_add(epoch as u64));
            batch_infos.shuffle(&mut rng);
            // Samples are only ever reordered within their own bucket.
            for ids in sample_ids.iter_mut() {
                ids.shuffle(&mut rng);
            }
        }
        let batch_sizes: Vec<usize> = self.buckets.iter().map(|b| b.batch_size).collect();

        let slice_batch = move |(bucket_id, begin): (usize, usize)| -> Vec<usize> {
            let ids = &sample_ids[bucket_id];
            let end = (begin + batch_sizes[bucket_id]).min(ids.len());
            ids[begin..end].to_vec()
        };

        if self.num_shards > 0 {
            let num_shards = self.num_shards;
            let total = batch_infos.len();
            let mut start = 0;
            Box::new(std::iter::from_fn(move || {
                if start >= total {
                    return None;
                }
                // A short final window is shifted backward, not truncated.
                let begin = if start + num_shards > total {
                    total - num_shards
                } else {
                    start
                };
                let step: Vec<Vec<usize>> = batch_infos[begin..begin + num_shards]
                    .iter()
                    .map(|&info| slice_batch(info))
                    .collect();
                start += num_shards;
                Some(BatchIndices::Sharded(step))
            }))
        } else {
            Box::new(
                batch_infos
                    .into_iter()
                    .map(move |info| BatchIndices::Flat(slice_batch(info))),
            )
        }
    }

    fn len(&self) -> usize {
        if self.num_shards > 0 {
            self.batch_infos.len().div_ceil(self.num_shards)
        } else {
            self.batch_infos.len()
        }
    }
}

/// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SEED: u64 = 42;

    mod sorted_sampler_tests {
        use super::*;

        #[test]
        fn sorts_descending_by_default_order() {
            let sampler = SortedSampler::new(&[7, 31, 12], true).unwrap();
            let order: Vec<_> = sampler.iter(0).collect();
            assert_eq!(order, vec![1, 2, 0]);
            assert_eq!(sampler.len(), 3);
        }

        #[test]
        fn sorts_ascending_when_requested() {
            let sampler = SortedSampler::new(&[7, 31, 12], false).unwrap();
            let order: Vec<_> = sampler.iter(0).collect();
            assert_eq!(order, vec![0, 2, 1]);
        }

        #[test]
        fn equal_keys_keep_original_order() {
            let sampler = SortedSampler::new(&[2, 2, 1, 2], true).unwrap();
            let order: Vec<_> = sampler.iter(0).collect();
            assert_eq!(order, vec![0, 1, 3, 2]);
        }

        #[test]
        fn identical_across_epochs() {
            let sampler = SortedSampler::new(&[5, 9, 1, 3], true).unwrap();
            let epoch0: Vec<_> = sampler.iter(0).collect();
            let epoch1: Vec<_> = sampler.iter(1).collect();
            assert_eq!(epoch0, epoch1);
        }

        #[test]
        fn rejects_empty_keys() {
            assert!(SortedSampler::new(&[] as &[i64], true).is_err());
        }
    }

    mod sorted_bucket_sampler_tests {
        use super::*;

        fn test_keys() -> Vec<i64> {
            vec![4, 17, 2, 9, 30, 11, 6, 25, 3, 14, 8, 21]
        }

        #[test]
        fn batches_are_sorted_within_each_window() {
            let keys = test_keys();
            let sampler =
                SortedBucketSampler::new(keys.clone(), 2, 3, true, false, TEST_SEED).unwrap();
            // Window size 6: two windows, each sorted descending independently.
            for batch in sampler.iter(0) {
                for window in batch.windows(2) {
                    assert!(keys[window[0]] >= keys[window[1]]);
                }
            }
        }

        #[test]
        fn covers_every_index_exactly_once() {
            let keys = test_keys();
            let sampler = SortedBucketSampler::new(keys, 5, 2, true, true, TEST_SEED).unwrap();
            let mut seen: Vec<usize> = sampler.iter(3).flatten().collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..12).collect::<Vec<_>>());
        }

        #[test]
        fn len_matches_produced_batches() {
            let sampler =
                SortedBucketSampler::new(test_keys(), 5, 2, true, false, TEST_SEED).unwrap();
            assert_eq!(sampler.len(), 3);
            assert_eq!(sampler.iter(0).count(), 3);
        }

        #[test]
        fn shuffling_is_deterministic_per_epoch() {
            let sampler =
                SortedBucketSampler::new(test_keys(), 2, 2, true, true, TEST_SEED).unwrap();
            let epoch1: Vec<_> = sampler.iter(1).collect();
            assert_eq!(epoch1, sampler.iter(1).collect::<Vec<_>>());
            assert_ne!(epoch1, sampler.iter(2).collect::<Vec<_>>());
        }

        #[test]
        fn rejects_invalid_parameters() {
            assert!(SortedBucketSampler::new(Vec::<i64>::new(), 2, 2, true, false, 0).is_err());
            assert!(SortedBucketSampler::new(vec![1i64, 2], 0, 2, true, false, 0).is_err());
            assert!(SortedBucketSampler::new(vec![1i64, 2], 2, 0, true, false, 0).is_err());
        }
    }

    mod fixed_bucket_sampler_tests {
        use super::*;

        fn flat_batches(sampler: &FixedBucketSampler, epoch: usize) -> Vec<Vec<usize>> {
            sampler
                .iter(epoch)
                .map(|batch| match batch {
                    BatchIndices::Flat(ids) => ids,
                    BatchIndices::Sharded(_) => panic!("expected flat batches"),
                })
                .collect()
        }

        #[test]
        fn schedules_largest_bucket_first() {
            let lengths = LengthTable::from_scalars(vec![5, 5, 5, 15, 15]).unwrap();
            let config = FixedBucketSamplerConfig::builder().num_buckets(2).build();
            let sampler = FixedBucketSampler::new(lengths, 2, config).unwrap();

            // Constant width over [5, 15] with 2 buckets gives keys {10, 15}.
            let keys: Vec<BucketKey> = sampler.buckets.iter().map(|b| b.key.clone()).collect();
            assert_eq!(keys, vec![vec![10], vec![15]]);

            let batches = flat_batches(&sampler, 0);
            assert_eq!(batches, vec![vec![3, 4], vec![0, 1], vec![2]]);
            assert_eq!(sampler.len(), 3);
        }

        #[test]
        fn ratio_scales_up_short_buckets() {
            let lengths =
                LengthTable::from_scalars(vec![3, 4, 5, 5, 40, 45, 50, 50]).unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .scalar_bucket_keys(vec![5, 50])
                .ratio(1.0)
                .build();
            let sampler = FixedBucketSampler::new(lengths, 4, config).unwrap();
            // Short bucket: floor(50 / 5 * 1.0 * 4) = 40; long bucket keeps the base.
            assert_eq!(sampler.buckets[0].batch_size, 40);
            assert_eq!(sampler.buckets[1].batch_size, 4);
        }

        #[test]
        fn ratio_batch_sizes_never_drop_below_base() {
            let lengths = LengthTable::from_scalars((1..=100).collect()).unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .num_buckets(10)
                .ratio(0.5)
                .build();
            let sampler = FixedBucketSampler::new(lengths, 8, config).unwrap();
            for bucket in &sampler.buckets {
                assert!(bucket.batch_size >= 8);
            }
        }

        #[test]
        fn average_length_policy_targets_token_budget() {
            let lengths =
                LengthTable::from_scalars(vec![10, 10, 10, 10, 20, 20, 20, 20]).unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .scalar_bucket_keys(vec![10, 20])
                .use_average_length(true)
                .build();
            let sampler = FixedBucketSampler::new(lengths, 40, config).unwrap();
            // Zero deviation inside each bucket: 40 / 10 = 4 and 40 / 20 = 2.
            assert_eq!(sampler.buckets[0].batch_size, 4);
            assert_eq!(sampler.buckets[1].batch_size, 2);
        }

        #[test]
        fn average_length_batch_sizes_stay_positive() {
            let lengths = LengthTable::from_scalars(vec![100, 150, 200, 250]).unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .num_buckets(2)
                .use_average_length(true)
                .ratio(0.5) // ignored under this policy
                .build();
            // Token budget far below the average length still yields batches of 1.
            let sampler = FixedBucketSampler::new(lengths, 8, config).unwrap();
            for bucket in &sampler.buckets {
                assert!(bucket.batch_size >= 1);
            }
        }

        #[test]
        fn drops_empty_buckets_from_schedule_and_stats() {
            let lengths = LengthTable::from_scalars(vec![3, 4, 9, 10]).unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .scalar_bucket_keys(vec![5, 10, 100])
                .build();
            let sampler = FixedBucketSampler::new(lengths, 2, config).unwrap();
            assert_eq!(sampler.buckets.len(), 2);
            let stats = sampler.stats();
            assert!(stats.contains("key=[5, 10]"));
            assert!(stats.contains("cnt=[2, 2]"));
            assert!(!stats.contains("100"));
        }

        #[test]
        fn deduplicates_and_sorts_explicit_keys() {
            let lengths = LengthTable::from_scalars(vec![2, 6, 9]).unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .scalar_bucket_keys(vec![10, 5, 10, 5])
                .build();
            let sampler = FixedBucketSampler::new(lengths, 1, config).unwrap();
            let keys: Vec<BucketKey> = sampler.buckets.iter().map(|b| b.key.clone()).collect();
            assert_eq!(keys, vec![vec![5], vec![10]]);
        }

        #[test]
        fn fails_when_a_length_has_no_covering_key() {
            let lengths = LengthTable::from_scalars(vec![3, 12]).unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .scalar_bucket_keys(vec![5, 10])
                .build();
            let err = FixedBucketSampler::new(lengths, 2, config).unwrap_err();
            assert!(matches!(err, Error::BucketFit { .. }));
        }

        #[test]
        fn rejects_invalid_configuration() {
            let lengths = || LengthTable::from_scalars(vec![3, 5, 7]).unwrap();
            assert!(FixedBucketSampler::new(
                lengths(),
                0,
                FixedBucketSamplerConfig::default()
            )
            .is_err());
            assert!(FixedBucketSampler::new(
                lengths(),
                2,
                FixedBucketSamplerConfig::builder().ratio(-0.5).build()
            )
            .is_err());
            assert!(FixedBucketSampler::new(
                lengths(),
                2,
                FixedBucketSamplerConfig::builder().num_buckets(0).build()
            )
            .is_err());
            assert!(FixedBucketSampler::new(
                lengths(),
                2,
                FixedBucketSamplerConfig::builder().bucket_keys(vec![]).build()
            )
            .is_err());
            // Arity mismatch between explicit keys and scalar lengths.
            assert!(FixedBucketSampler::new(
                lengths(),
                2,
                FixedBucketSamplerConfig::builder()
                    .bucket_keys(vec![vec![7, 7]])
                    .build()
            )
            .is_err());
        }

        #[test]
        fn tuple_lengths_bucket_jointly() {
            let lengths = LengthTable::from_tuples(vec![
                vec![4, 6],
                vec![9, 11],
                vec![5, 5],
                vec![10, 12],
            ])
            .unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .bucket_keys(vec![vec![5, 6], vec![10, 12]])
                .build();
            let sampler = FixedBucketSampler::new(lengths, 2, config).unwrap();
            assert_eq!(sampler.buckets[0].sample_ids, vec![0, 2]);
            assert_eq!(sampler.buckets[1].sample_ids, vec![1, 3]);
        }

        #[test]
        fn sharded_steps_always_hold_num_shards_batches() {
            let lengths = LengthTable::from_scalars(vec![5, 5, 5, 15, 15]).unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .num_buckets(2)
                .num_shards(2)
                .build();
            let sampler = FixedBucketSampler::new(lengths, 1, config).unwrap();
            // 5 schedule entries in 2-wide windows: the last window shifts back.
            assert_eq!(sampler.len(), 3);
            let steps: Vec<Vec<Vec<usize>>> = sampler
                .iter(0)
                .map(|batch| match batch {
                    BatchIndices::Sharded(shards) => shards,
                    BatchIndices::Flat(_) => panic!("expected sharded batches"),
                })
                .collect();
            assert_eq!(steps.len(), 3);
            for step in &steps {
                assert_eq!(step.len(), 2);
            }
            assert_eq!(steps[0], vec![vec![3], vec![4]]);
            assert_eq!(steps[1], vec![vec![0], vec![1]]);
            // Overlapping final window repeats entry (0, 1).
            assert_eq!(steps[2], vec![vec![1], vec![2]]);
        }

        #[test]
        fn rejects_more_shards_than_batches() {
            let lengths = LengthTable::from_scalars(vec![5, 5, 5, 15, 15]).unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .num_buckets(2)
                .num_shards(4)
                .build();
            assert!(FixedBucketSampler::new(lengths, 2, config).is_err());
        }

        #[test]
        fn shuffling_is_reproducible_and_stays_within_buckets() {
            let lengths = LengthTable::from_scalars((1..=30).collect()).unwrap();
            let config = FixedBucketSamplerConfig::builder()
                .num_buckets(3)
                .shuffle(true)
                .seed(TEST_SEED)
                .build();
            let sampler = FixedBucketSampler::new(lengths, 4, config).unwrap();

            let epoch1 = flat_batches(&sampler, 1);
            assert_eq!(epoch1, flat_batches(&sampler, 1));
            assert_ne!(epoch1, flat_batches(&sampler, 2));

            // Every pass covers every sample exactly once.
            let mut seen: Vec<usize> = epoch1.into_iter().flatten().collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..30).collect::<Vec<_>>());
        }

        #[test]
        fn len_matches_produced_batches_without_shuffling() {
            let lengths = LengthTable::from_scalars((1..=97).collect()).unwrap();
            let config = FixedBucketSamplerConfig::builder().num_buckets(8).build();
            let sampler = FixedBucketSampler::new(lengths, 8, config).unwrap();
            assert_eq!(sampler.iter(0).count(), sampler.len());
        }

        #[test]
        fn stats_reports_counts_and_batch_sizes() {
            let lengths = LengthTable::from_scalars(vec![5, 5, 5, 15, 15]).unwrap();
            let config = FixedBucketSamplerConfig::builder().num_buckets(2).build();
            let sampler = FixedBucketSampler::new(lengths, 2, config).unwrap();
            let stats = sampler.stats();
            assert!(stats.contains("sample_num=5, batch_num=3"));
            assert!(stats.contains("key=[10, 15]"));
            assert!(stats.contains("cnt=[3, 2]"));
            assert!(stats.contains("batch_size=[2, 2]"));
        }
    }
}
