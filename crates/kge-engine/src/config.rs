//! Configuration for batching, evaluation and training.
//!
//! Every knob is an explicit constructor argument; nothing is read from the
//! environment. All structs deserialize with serde (missing fields take their
//! defaults), so an external loader can read them from JSON or TOML.
//!
//! ```rust,ignore
//! use kge_engine::{CorruptionMode, TrainingConfig};
//!
//! let config = TrainingConfig::default()
//!     .with_batch_size(256)
//!     .with_negative_samples(10)
//!     .with_corruption_mode(CorruptionMode::Bernoulli)
//!     .with_epochs(200)
//!     .with_seed(7);
//! config.validate()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sampler::{CorruptionMode, FilterPolicy, DEFAULT_RETRY_FACTOR};

/// Batch assembly configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Positive triples per batch (default: 512).
    pub batch_size: usize,
    /// Negatives per positive, the `k` of negative sampling (default: 5).
    pub negatives: usize,
    /// Corruption strategy (default: corrupt head or tail with a fair coin).
    pub mode: CorruptionMode,
    /// Exclude known triples from negatives (default: filtered).
    pub filter_policy: FilterPolicy,
    /// Sampling attempts allowed per positive, as a multiple of `negatives` (default: 10).
    pub retry_factor: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 512,
            negatives: 5,
            mode: CorruptionMode::default(),
            filter_policy: FilterPolicy::Filtered,
            retry_factor: DEFAULT_RETRY_FACTOR,
        }
    }
}

impl BatchConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_negatives(mut self, k: usize) -> Self {
        self.negatives = k;
        self
    }

    pub fn with_mode(mut self, mode: CorruptionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_filter_policy(mut self, policy: FilterPolicy) -> Self {
        self.filter_policy = policy;
        self
    }

    pub fn with_retry_factor(mut self, factor: usize) -> Self {
        self.retry_factor = factor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::invalid_config("batch_size must be at least 1"));
        }
        if self.retry_factor == 0 {
            return Err(Error::invalid_config("retry_factor must be at least 1"));
        }
        Ok(())
    }
}

/// Rank evaluation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Raw or filtered ranking (default: filtered).
    pub filter_policy: FilterPolicy,
    /// Thresholds reported as hits@K (default: 1, 3, 10).
    pub hits_at: Vec<usize>,
    /// Only rank the first N triples of the split (default: all).
    pub max_triples: Option<usize>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            filter_policy: FilterPolicy::Filtered,
            hits_at: vec![1, 3, 10],
            max_triples: None,
        }
    }
}

impl EvalConfig {
    pub fn with_filter_policy(mut self, policy: FilterPolicy) -> Self {
        self.filter_policy = policy;
        self
    }

    pub fn with_hits_at(mut self, hits_at: impl IntoIterator<Item = usize>) -> Self {
        self.hits_at = hits_at.into_iter().collect();
        self
    }

    pub fn with_max_triples(mut self, n: usize) -> Self {
        self.max_triples = Some(n);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.hits_at.is_empty() {
            return Err(Error::invalid_config("hits_at must name at least one K"));
        }
        if self.hits_at.contains(&0) {
            return Err(Error::invalid_config("hits_at thresholds must be >= 1"));
        }
        Ok(())
    }

    /// Sorted, deduplicated thresholds.
    pub(crate) fn normalized_hits_at(&self) -> Vec<usize> {
        let mut ks = self.hits_at.clone();
        ks.sort_unstable();
        ks.dedup();
        ks
    }
}

/// Training loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of passes over the training split (default: 100).
    pub epochs: usize,
    /// RNG seed for shuffling and sampling (default: 42).
    pub seed: u64,
    /// Evaluate on the validation split every N epochs; 0 disables (default: 10).
    pub eval_every: usize,
    /// Stop after this many evaluations without MRR improvement (default: 5).
    pub patience: Option<usize>,
    pub batch: BatchConfig,
    pub eval: EvalConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            seed: 42,
            eval_every: 10,
            patience: Some(5),
            batch: BatchConfig::default(),
            eval: EvalConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch.batch_size = batch_size;
        self
    }

    pub fn with_negative_samples(mut self, k: usize) -> Self {
        self.batch.negatives = k;
        self
    }

    pub fn with_corruption_mode(mut self, mode: CorruptionMode) -> Self {
        self.batch.mode = mode;
        self
    }

    pub fn with_eval_every(mut self, every: usize) -> Self {
        self.eval_every = every;
        self
    }

    pub fn with_patience(mut self, patience: Option<usize>) -> Self {
        self.patience = patience;
        self
    }

    pub fn with_eval(mut self, eval: EvalConfig) -> Self {
        self.eval = eval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::invalid_config("epochs must be at least 1"));
        }
        self.batch.validate()?;
        self.eval.validate()
    }
}
