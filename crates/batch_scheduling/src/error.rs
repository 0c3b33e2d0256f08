//! batch_scheduling error types

use crate::length::format_rows;

/// batch_scheduling result type
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal construction-time errors.
///
/// All configuration and fit checks run when a sampler is built; a sampler
/// that constructed successfully stays internally consistent for its whole
/// lifetime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected sampler configuration
    #[error("invalid configuration: {reason}")]
    Configuration {
        /// Why the configuration was rejected
        reason: String,
    },

    /// Sequence lengths with no covering bucket key
    #[error(
        "found sequence lengths that cannot fit in the given buckets, seq_lengths={}, bucket_keys={}; increase the bucket range to cover them",
        format_rows(.unmatched_lengths),
        format_rows(.bucket_keys)
    )]
    BucketFit {
        /// Lengths no key dominates in every dimension
        unmatched_lengths: Vec<Vec<i64>>,
        /// The active, sorted bucket keys
        bucket_keys: Vec<Vec<i64>>,
    },
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Error::Configuration {
            reason: reason.into(),
        }
    }
}
