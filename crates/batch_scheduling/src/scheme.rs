//! Bucket key generation schemes.
//!
//! A scheme turns the observed length range `[min, max]` and a bucket count
//! into representative bucket keys. Multi-attribute lengths apply the scalar
//! formula independently per dimension, producing tuple keys that cover the
//! range in every dimension.

/// A representative length (or per-attribute length vector) that samples
/// assigned to the bucket may not exceed.
pub type BucketKey = Vec<i64>;

/// Generates bucket keys from the per-attribute length range.
///
/// The returned keys are raw: callers sort them ascending and deduplicate
/// before use. Every scheme guarantees that after sorting the final key
/// dominates `max_lengths` in every dimension, so coverage holds.
pub trait BucketScheme: Send + Sync {
    /// Generate `num_buckets` keys spanning `[min_lengths, max_lengths]`.
    fn bucket_keys(
        &self,
        max_lengths: &[i64],
        min_lengths: &[i64],
        num_buckets: usize,
    ) -> Vec<BucketKey>;
}

/// Buckets with constant width.
///
/// Per dimension: `width = max((1 + max - min) / num_buckets, 1)` and
/// `key_i = max(max - i * width, min)`, so the first generated key is always
/// the observed maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstWidthBucket;

impl BucketScheme for ConstWidthBucket {
    fn bucket_keys(
        &self,
        max_lengths: &[i64],
        min_lengths: &[i64],
        num_buckets: usize,
    ) -> Vec<BucketKey> {
        let widths: Vec<i64> = max_lengths
            .iter()
            .zip(min_lengths)
            .map(|(&max, &min)| ((1 + max - min) / num_buckets as i64).max(1))
            .collect();
        (0..num_buckets as i64)
            .map(|i| {
                max_lengths
                    .iter()
                    .zip(min_lengths)
                    .zip(&widths)
                    .map(|((&max, &min), &width)| (max - i * width).max(min))
                    .collect()
            })
            .collect()
    }
}

/// Buckets with linearly increasing width: `w_i = alpha * i + 1`.
///
/// `alpha` is solved so the cumulative width spans `[min, max]` exactly over
/// `num_buckets` steps; the last key is clamped up to the maximum to keep
/// coverage under rounding.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearWidthBucket;

impl BucketScheme for LinearWidthBucket {
    fn bucket_keys(
        &self,
        max_lengths: &[i64],
        min_lengths: &[i64],
        num_buckets: usize,
    ) -> Vec<BucketKey> {
        let b = num_buckets as f64;
        let alphas: Vec<f64> = max_lengths
            .iter()
            .zip(min_lengths)
            .map(|(&max, &min)| 2.0 * (max - min - num_buckets as i64) as f64 / (b * (b + 1.0)))
            .collect();
        let mut keys: Vec<BucketKey> = (0..num_buckets)
            .map(|i| {
                min_lengths
                    .iter()
                    .zip(&alphas)
                    .map(|(&min, &alpha)| {
                        let cumulative = alpha * (((i + 1) * (i + 2)) as f64 / 2.0);
                        (min as f64 + cumulative + (i + 1) as f64).round() as i64
                    })
                    .collect()
            })
            .collect();
        clamp_last_to_max(&mut keys, max_lengths);
        keys
    }
}

/// Buckets with exponentially increasing width:
/// `w_i = bucket_len_step * w_{i-1}`.
#[derive(Debug, Clone, Copy)]
pub struct ExpWidthBucket {
    /// Growth factor between consecutive bucket widths; must exceed 1.
    bucket_len_step: f64,
}

impl ExpWidthBucket {
    pub fn new(bucket_len_step: f64) -> Self {
        debug_assert!(bucket_len_step > 1.0);
        Self { bucket_len_step }
    }
}

impl Default for ExpWidthBucket {
    fn default() -> Self {
        Self {
            bucket_len_step: 1.1,
        }
    }
}

impl BucketScheme for ExpWidthBucket {
    fn bucket_keys(
        &self,
        max_lengths: &[i64],
        min_lengths: &[i64],
        num_buckets: usize,
    ) -> Vec<BucketKey> {
        let step = self.bucket_len_step;
        let initial_widths: Vec<f64> = max_lengths
            .iter()
            .zip(min_lengths)
            .map(|(&max, &min)| {
                (max - min) as f64 * (step - 1.0) / (step.powi(num_buckets as i32) - 1.0)
            })
            .collect();
        let mut keys: Vec<BucketKey> = (0..num_buckets)
            .map(|i| {
                min_lengths
                    .iter()
                    .zip(&initial_widths)
                    .map(|(&min, &initial)| {
                        let cumulative = initial * (step.powi(i as i32 + 1) - 1.0) / (step - 1.0);
                        (min as f64 + cumulative).round() as i64
                    })
                    .collect()
            })
            .collect();
        clamp_last_to_max(&mut keys, max_lengths);
        keys
    }
}

/// Rounding can leave the last generated key below the observed maximum;
/// clamping it upward keeps every length coverable.
fn clamp_last_to_max(keys: &mut [BucketKey], max_lengths: &[i64]) {
    if let Some(last) = keys.last_mut() {
        for (key, &max) in last.iter_mut().zip(max_lengths) {
            *key = (*key).max(max);
        }
    }
}
