//! TransE: relations as translations (Bordes et al. 2013).
//!
//! ```text
//! h + r ≈ t  (if the triple is true)
//! ```
//!
//! Score = -‖h + r - t‖ under the configured [`Norm`](super::Norm) (L2 by
//! default), so higher means more plausible. Entity rows are kept on the
//! unit sphere after every update.

use super::{seeded_rng, EmbeddingTable, ModelParams};
use crate::batch::Batch;
use crate::error::Result;
use crate::model::ScoringModel;
use crate::triple::Triple;

/// TransE over dense, index-addressed embedding tables.
#[derive(Debug, Clone)]
pub struct TransE {
    entities: EmbeddingTable,
    relations: EmbeddingTable,
    params: ModelParams,
}

impl TransE {
    pub fn new(num_entities: usize, num_relations: usize, params: ModelParams) -> Self {
        let mut rng = seeded_rng(params.seed);
        Self {
            entities: EmbeddingTable::uniform(num_entities, params.dim, &mut rng, true),
            relations: EmbeddingTable::uniform(num_relations, params.dim, &mut rng, true),
            params,
        }
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// `h + r - t` for a triple, copied out of the tables.
    pub(super) fn residual(&self, triple: &Triple) -> Result<Vec<f32>> {
        let h = self.entities.row(triple.head as usize)?;
        let r = self.relations.row(triple.relation as usize)?;
        let t = self.entities.row(triple.tail as usize)?;
        Ok(h.iter().zip(r).zip(t).map(|((h, r), t)| h + r - t).collect())
    }

    /// Distance of a triple under the configured norm.
    pub(super) fn distance(&self, triple: &Triple) -> Result<f32> {
        Ok(self.params.norm.distance(&self.residual(triple)?))
    }

    /// Apply `-weight * lr * ∂d/∂·` for one triple given its residual.
    ///
    /// Positive weights shrink the distance, negative weights grow it.
    pub(super) fn step(&mut self, triple: &Triple, residual: &[f32], distance: f32, weight: f32) {
        let grad = self.params.norm.gradient(residual, distance);
        let alpha = -weight * self.params.learning_rate;
        self.entities.add_scaled(triple.head as usize, &grad, alpha);
        self.relations.add_scaled(triple.relation as usize, &grad, alpha);
        self.entities.add_scaled(triple.tail as usize, &grad, -alpha);
    }

    pub(super) fn renormalize(&mut self, pos: &Triple, neg: &Triple) {
        for e in [pos.head, pos.tail, neg.head, neg.tail] {
            self.entities.normalize_row(e as usize);
        }
    }
}

impl ScoringModel for TransE {
    fn name(&self) -> &str {
        "TransE"
    }

    fn score(&self, triples: &[Triple]) -> Result<Vec<f32>> {
        triples
            .iter()
            .map(|t| self.distance(t).map(|d| -d))
            .collect()
    }

    fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        let mut total = 0.0;
        let mut pairs = 0usize;

        for (pos, neg) in batch.pairs() {
            let pos_res = self.residual(&pos)?;
            let neg_res = self.residual(&neg)?;
            let norm = self.params.norm;
            let (d_pos, d_neg) = (norm.distance(&pos_res), norm.distance(&neg_res));

            let loss = (self.params.margin + d_pos - d_neg).max(0.0);
            total += loss;
            pairs += 1;

            if loss > 0.0 {
                // Pull the positive together, push the negative apart.
                self.step(&pos, &pos_res, d_pos, 1.0);
                self.step(&neg, &neg_res, d_neg, -1.0);
                self.renormalize(&pos, &neg);
            }
        }

        Ok(if pairs > 0 { total / pairs as f32 } else { 0.0 })
    }
}
