//! Skip-gram context-window batch generation over a coded corpus.

use crate::error::{Error, Result};
use crate::sampler::Sampler;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// How per-center context rows are computed within a batch.
///
/// Each row depends only on the pass seed and the center's flattened
/// position, never on execution order, so both strategies produce
/// bit-identical output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    #[default]
    Sequential,
    /// Order-preserving parallel map over the batch rows.
    Parallel,
}

/// One batch of skip-gram training positions.
///
/// `center` has shape `(batch, 1)`; `context` and `mask` have shape
/// `(batch, 2 * window)`. `context` is right-padded with zero and `mask`
/// carries ones exactly at the valid context slots, so the row sum of `mask`
/// equals the true context length.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBatch {
    pub center: Array2<i64>,
    pub context: Array2<i64>,
    pub mask: Array2<i64>,
}

/// Configuration for [`ContextWindowSampler`].
///
/// Example:
/// ```ignore
/// let config = ContextWindowConfig::builder()
///     .window(5)
///     .random_window_size(true)
///     .seed(42)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ContextWindowConfig {
    /// Maximum number of context tokens considered left and right of each
    /// center (defaults to 5).
    pub window: usize,
    /// Draw the effective window for each center uniformly from
    /// `[1, window]` (defaults to true).
    pub random_window_size: bool,
    /// Shuffle the sentence order every pass (defaults to true).
    pub shuffle: bool,
    /// Base RNG seed; the pass RNG is derived from `seed + epoch`.
    pub seed: u64,
    /// How per-center rows are computed.
    pub strategy: ExecutionStrategy,
}

impl Default for ContextWindowConfig {
    fn default() -> Self {
        Self {
            window: 5,
            random_window_size: true,
            shuffle: true,
            seed: 0,
            strategy: ExecutionStrategy::Sequential,
        }
    }
}

impl ContextWindowConfig {
    pub fn builder() -> ContextWindowConfigBuilder {
        ContextWindowConfigBuilder::default()
    }
}

/// Builder for [`ContextWindowConfig`] with method chaining.
#[derive(Default)]
pub struct ContextWindowConfigBuilder {
    config: ContextWindowConfig,
}

impl ContextWindowConfigBuilder {
    /// Set the maximum one-sided window radius (must be >= 1).
    pub fn window(mut self, window: usize) -> Self {
        self.config.window = window;
        self
    }

    /// Set whether each center draws a reduced window size.
    pub fn random_window_size(mut self, random_window_size: bool) -> Self {
        self.config.random_window_size = random_window_size;
        self
    }

    /// Set whether sentences are shuffled every pass.
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    /// Set the base RNG seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Set the per-batch execution strategy.
    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> ContextWindowConfig {
        self.config
    }
}

/// ============================================================================
/// Samples batches of (center, context, mask) rows from a coded corpus.
///
/// A context never crosses the sentence that contains its center. Sentences
/// with fewer than two tokens carry no usable context and are filtered at
/// construction.
///
/// Per pass: the sentence order is optionally shuffled, the corpus is
/// flattened into one token array plus cumulative sentence boundaries, and a
/// single 32-bit pass seed is drawn. Each center's effective window (when
/// `random_window_size` is on) comes from an RNG seeded with
/// `pass_seed + center_position` alone, so a pass is reproducible however the
/// per-center work is scheduled.
///
/// # Arguments:
/// - `coded`: List of coded sentences; a coded sentence is a list of
///   non-negative token ids.
/// - `batch_size`: Maximum rows per batch; the final batch of a pass may be
///   smaller.
/// - `config`: See [`ContextWindowConfig`].
///
/// # Example
/// ```ignore
/// let config = ContextWindowConfig::builder()
///     .window(1)
///     .random_window_size(false)
///     .shuffle(false)
///     .build();
/// let sampler = ContextWindowSampler::new(vec![vec![1, 2, 3, 4, 5]], 5, config)?;
/// for batch in sampler.iter(0) {
///     // batch.center: (5, 1), batch.context / batch.mask: (5, 2)
/// }
/// ```
pub struct ContextWindowSampler {
    sentences: Vec<Vec<i64>>,
    batch_size: usize,
    config: ContextWindowConfig,
    num_samples: usize,
}

impl ContextWindowSampler {
    pub fn new(
        coded: Vec<Vec<i64>>,
        batch_size: usize,
        config: ContextWindowConfig,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::config("batch_size must be larger than 0"));
        }
        if config.window == 0 {
            return Err(Error::config("window must be larger than 0"));
        }
        if coded.is_empty() {
            return Err(Error::config("coded corpus must not be empty"));
        }
        if let Some(&bad) = coded.iter().flatten().find(|&&token| token < 0) {
            return Err(Error::config(format!(
                "token ids must be non-negative, got {}",
                bad
            )));
        }
        let sentences: Vec<Vec<i64>> = coded
            .into_iter()
            .filter(|sentence| sentence.len() > 1)
            .collect();
        if sentences.is_empty() {
            return Err(Error::config(
                "no sentence has more than one token, nothing to sample",
            ));
        }
        let num_samples = sentences.iter().map(Vec::len).sum();
        Ok(Self {
            sentences,
            batch_size,
            config,
            num_samples,
        })
    }

    /// Total number of center positions one pass iterates over.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }
}

impl Sampler for ContextWindowSampler {
    type Item = ContextBatch;

    fn iter(&self, epoch: usize) -> Box<dyn Iterator<Item = ContextBatch> + Send + '_> {
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(epoch as u64));
        let mut sentences = self.sentences.clone();
        if self.config.shuffle {
            sentences.shuffle(&mut rng);
        }

        let mut tokens: Vec<i64> = Vec::with_capacity(self.num_samples);
        let mut boundaries: Vec<usize> = Vec::with_capacity(sentences.len());
        for sentence in &sentences {
            tokens.extend_from_slice(sentence);
            boundaries.push(tokens.len());
        }
        // One seed for the whole pass; per-center randomness derives from it.
        let pass_seed: u32 = rng.random();

        let batch_size = self.batch_size;
        let window = self.config.window;
        let random_window_size = self.config.random_window_size;
        let strategy = self.config.strategy;
        let max_len = 2 * window;
        let mut pointer = 0;

        Box::new(std::iter::from_fn(move || {
            if pointer >= tokens.len() {
                return None;
            }
            let width = batch_size.min(tokens.len() - pointer);
            let rows = batch_rows(
                &tokens,
                &boundaries,
                pointer,
                width,
                window,
                random_window_size,
                pass_seed,
                strategy,
            );

            let mut center = Array2::<i64>::zeros((width, 1));
            let mut context = Array2::<i64>::zeros((width, max_len));
            let mut mask = Array2::<i64>::zeros((width, max_len));
            for (i, row) in rows.iter().enumerate() {
                center[[i, 0]] = tokens[pointer + i];
                for (j, &token) in row.iter().enumerate() {
                    context[[i, j]] = token;
                    mask[[i, j]] = 1;
                }
            }
            pointer += width;
            Some(ContextBatch {
                center,
                context,
                mask,
            })
        }))
    }

    fn len(&self) -> usize {
        self.num_samples.div_ceil(self.batch_size)
    }
}

#[allow(clippy::too_many_arguments)]
fn batch_rows(
    tokens: &[i64],
    boundaries: &[usize],
    pointer: usize,
    width: usize,
    window: usize,
    random_window_size: bool,
    pass_seed: u32,
    strategy: ExecutionStrategy,
) -> Vec<Vec<i64>> {
    let row = |i: usize| {
        context_for(
            tokens,
            boundaries,
            pointer + i,
            window,
            random_window_size,
            pass_seed,
        )
    };
    match strategy {
        ExecutionStrategy::Sequential => (0..width).map(row).collect(),
        ExecutionStrategy::Parallel => (0..width).into_par_iter().map(row).collect(),
    }
}

/// Start and end (exclusive) of the sentence containing `center` within the
/// flattened corpus.
fn sentence_span(boundaries: &[usize], center: usize) -> (usize, usize) {
    let sentence = boundaries.partition_point(|&end| end <= center);
    let start = if sentence == 0 {
        0
    } else {
        boundaries[sentence - 1]
    };
    (start, boundaries[sentence])
}

/// Context tokens for one center, bounded by its sentence.
///
/// Randomness depends only on `(pass_seed, center)`, never on call order.
fn context_for(
    tokens: &[i64],
    boundaries: &[usize],
    center: usize,
    window: usize,
    random_window_size: bool,
    pass_seed: u32,
) -> Vec<i64> {
    let (sentence_start, sentence_end) = sentence_span(boundaries, center);
    let window = if random_window_size {
        let mut rng = StdRng::seed_from_u64((pass_seed as u64).wrapping_add(center as u64));
        rng.random_range(1..=window)
    } else {
        window
    };
    let left_begin = sentence_start.max(center.saturating_sub(window));
    let right_end = sentence_end.min(center + window + 1);

    let mut context = Vec::with_capacity(2 * window);
    context.extend_from_slice(&tokens[left_begin..center]);
    context.extend_from_slice(&tokens[center + 1..right_end]);
    if context.is_empty() {
        panic!(
            "no context tokens on either side of center position {}; \
             a sentence shorter than two tokens reached the generator",
            center
        );
    }
    context
}
