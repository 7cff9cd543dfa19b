//! The scoring-model capability consumed by training and evaluation.

use crate::batch::Batch;
use crate::error::Result;
use crate::triple::Triple;

/// A trainable triple scorer.
///
/// Implementations are chosen at construction time (see
/// [`crate::models::ModelKind`]); the engine only ever talks to this trait.
pub trait ScoringModel {
    /// Short model name for logs and reports.
    fn name(&self) -> &str;

    /// Plausibility score per triple, higher is more plausible.
    ///
    /// Must return exactly one score per input triple, in input order, and
    /// must not mutate model state. The evaluator treats a wrong count as a
    /// fatal contract violation.
    fn score(&self, triples: &[Triple]) -> Result<Vec<f32>>;

    /// One optimization step on a batch. Returns the batch loss.
    fn train_step(&mut self, batch: &Batch) -> Result<f32>;
}

impl<M: ScoringModel + ?Sized> ScoringModel for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn score(&self, triples: &[Triple]) -> Result<Vec<f32>> {
        (**self).score(triples)
    }

    fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        (**self).train_step(batch)
    }
}
