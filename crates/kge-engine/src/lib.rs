//! Training and evaluation engine for knowledge graph embeddings.
//!
//! Knowledge graphs store facts as (head, relation, tail) triples:
//! `(Einstein, won, NobelPrize)`, `(Paris, capitalOf, France)`. An embedding
//! model learns to **score true triples above false ones**. This crate is the
//! machinery around any such model: it stores the dataset splits, produces
//! negative examples, feeds training batches, and measures link prediction
//! quality by rank.
//!
//! ## Pipeline
//!
//! ```text
//! Vocabulary ──> TripleStore ──> NegativeSampler ──> BatchGenerator ──> ScoringModel
//!                     │                                                     │
//!                     └──────────────> RankEvaluator <──────────────────────┘
//!                                           │
//!                                     CorpusMetrics
//! ```
//!
//! [`Trainer`] ties the two halves together: epochs of batches into
//! [`ScoringModel::train_step`], periodic validation, early stopping.
//!
//! ## Negative Sampling
//!
//! A negative is a positive with one slot replaced. Which slot:
//!
//! | Mode | Replaces |
//! |------|----------|
//! | `CorruptHead` | head |
//! | `CorruptTail` | tail |
//! | `CorruptBoth` | head or tail, fair coin |
//! | `CorruptRelation` | relation |
//! | `Bernoulli` | head with probability tph / (tph + hpt) |
//!
//! Bernoulli sampling ([Wang et al. 2014](https://ojs.aaai.org/index.php/AAAI/article/view/8870))
//! corrupts the "many" side of a relation less often, which produces fewer
//! false negatives on one-to-many and many-to-one relations.
//!
//! Under [`FilterPolicy::Filtered`] a candidate that is a known triple in
//! *any* split is rejected. Sampling gives up after `k * retry_factor`
//! draws and reports the shortfall rather than looping forever.
//!
//! ## Evaluation
//!
//! For each test triple (h, r, t), every entity is tried in the tail slot
//! (and then the head slot) and the truth is ranked by descending score:
//!
//! ```text
//! rank = 1 + #{ e : score(h, r, e) > score(h, r, t) }
//!          + #{ e < t : score(h, r, e) = score(h, r, t) }
//! ```
//!
//! Filtered ranks skip candidates that are themselves known triples, so a
//! model is not penalized for ranking another true answer first. Reported
//! metrics:
//!
//! - **MR**: mean rank (lower is better)
//! - **MRR**: mean reciprocal rank (higher is better)
//! - **Hits@K**: fraction of ranks ≤ K
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kge_engine::models::{ModelKind, ModelParams};
//! use kge_engine::{EvalConfig, RankEvaluator, Split, Trainer, TrainingConfig, Vocabulary};
//!
//! let vocab = Vocabulary::build([&train, &valid, &test]);
//! let store = Arc::new(vocab.build_store(&train, &valid, &test)?);
//!
//! let mut model = ModelKind::TransE.build(&store, ModelParams::default());
//! let report = Trainer::new(store.clone(), TrainingConfig::default())?.fit(&mut model)?;
//!
//! let evaluator = RankEvaluator::new(store, EvalConfig::default())?;
//! println!("{}", evaluator.evaluate(Split::Test, &model)?.summary());
//! ```
//!
//! ## References
//!
//! - Bordes et al. (2013). "Translating Embeddings for Modeling
//!   Multi-relational Data." NIPS.
//! - Wang et al. (2014). "Knowledge Graph Embedding by Translating on
//!   Hyperplanes." AAAI.
//! - Yang et al. (2015). "Embedding Entities and Relations for Learning and
//!   Inference in Knowledge Bases." ICLR.

mod batch;
mod cancel;
mod config;
mod error;
mod eval;
mod model;
pub mod models;
mod sampler;
mod store;
mod trainer;
mod triple;
mod vocab;

pub use batch::{Batch, BatchGenerator, Epoch, EpochReport, PositiveGroup};
pub use cancel::CancelToken;
pub use config::{BatchConfig, EvalConfig, TrainingConfig};
pub use error::{Error, IndexKind, Result};
pub use eval::{CorpusMetrics, RankEvaluator, RankMetrics, RankResult};
pub use model::ScoringModel;
pub use sampler::{
    CorruptionMode, FilterPolicy, NegativeSampler, SampleOutcome, DEFAULT_RETRY_FACTOR,
};
pub use store::{RelationStats, StoreStats, TripleStore};
pub use trainer::{Trainer, TrainingReport, ValidationPoint};
pub use triple::{EntityId, RelationId, Side, Split, SplitScope, Triple};
pub use vocab::Vocabulary;
