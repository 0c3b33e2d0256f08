pub mod bucketing;
pub mod context;
pub mod error;
pub mod length;
pub mod sampler;
pub mod scheme;

pub use context::{
    ContextBatch, ContextWindowConfig, ContextWindowSampler, ExecutionStrategy,
};
pub use error::{Error, Result};
pub use length::LengthTable;
pub use sampler::{
    BatchIndices, FixedBucketSampler, FixedBucketSamplerConfig, Sampler, SortedBucketSampler,
    SortedSampler,
};
pub use scheme::{BucketKey, BucketScheme, ConstWidthBucket, ExpWidthBucket, LinearWidthBucket};
