//! Tightest-fit assignment of samples to bucket keys, plus per-bucket
//! length statistics.

use crate::error::{Error, Result};
use crate::length::LengthTable;
use crate::scheme::BucketKey;

/// Samples are matched in fixed-size chunks so the transient per-chunk state
/// stays bounded on large datasets.
pub(crate) const ASSIGN_CHUNK_SIZE: usize = 10_000;

/// Assigns every sample to the bucket whose key dominates its length in every
/// dimension with the least total slack (first key wins on ties).
///
/// Returns one sample-id list per bucket key, each in original sample order.
/// Fails with [`Error::BucketFit`] if any sample has no dominating key.
pub fn assign_to_buckets(
    bucket_keys: &[BucketKey],
    lengths: &LengthTable,
) -> Result<Vec<Vec<usize>>> {
    let mut bucket_sample_ids: Vec<Vec<usize>> = vec![Vec::new(); bucket_keys.len()];
    let num_samples = lengths.num_samples();
    let mut begin = 0;
    while begin < num_samples {
        let end = (begin + ASSIGN_CHUNK_SIZE).min(num_samples);
        let mut unmatched: Vec<usize> = Vec::new();
        for sample_id in begin..end {
            let length = lengths.row(sample_id);
            let mut best: Option<(usize, i64)> = None;
            for (bucket_id, key) in bucket_keys.iter().enumerate() {
                if key.iter().zip(length).all(|(k, l)| k >= l) {
                    let slack: i64 = key.iter().zip(length).map(|(k, l)| k - l).sum();
                    if best.map_or(true, |(_, smallest)| slack < smallest) {
                        best = Some((bucket_id, slack));
                    }
                }
            }
            match best {
                Some((bucket_id, _)) => bucket_sample_ids[bucket_id].push(sample_id),
                None => unmatched.push(sample_id),
            }
        }
        if !unmatched.is_empty() {
            return Err(Error::BucketFit {
                unmatched_lengths: unmatched.iter().map(|&id| lengths.row(id).to_vec()).collect(),
                bucket_keys: bucket_keys.to_vec(),
            });
        }
        begin = end;
    }
    Ok(bucket_sample_ids)
}

/// Population mean and standard deviation of the lengths assigned to a bucket.
#[derive(Debug, Clone, Copy)]
pub struct BucketStats {
    pub mean: f64,
    pub std: f64,
}

/// Per-bucket statistics over all length elements of the assigned samples.
pub fn bucket_stats(bucket_sample_ids: &[Vec<usize>], lengths: &LengthTable) -> Vec<BucketStats> {
    bucket_sample_ids
        .iter()
        .map(|sample_ids| {
            if sample_ids.is_empty() {
                return BucketStats { mean: 0.0, std: 0.0 };
            }
            let values: Vec<f64> = sample_ids
                .iter()
                .flat_map(|&id| lengths.row(id).iter().map(|&v| v as f64))
                .collect();
            let count = values.len() as f64;
            let mean = values.iter().sum::<f64>() / count;
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
            BucketStats {
                mean,
                std: variance.sqrt(),
            }
        })
        .collect()
}
