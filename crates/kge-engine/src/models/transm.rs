//! TransM: translations weighted by relation mapping degree (Fan et al. 2014).
//!
//! ```text
//! score = -θᵣ ‖h + r - t‖
//! θᵣ    = 1 / ln(2 + facts/(1 + tails) + facts/(1 + heads))
//! ```
//!
//! θᵣ is fixed from the training split when the model is built and never
//! trained. One-to-one relations keep weights near 1; relations with many
//! heads or tails per fact get smaller weights, so their translations are
//! penalized less for being loose.

use super::{ModelParams, TransE};
use crate::batch::Batch;
use crate::error::{Error, Result};
use crate::model::ScoringModel;
use crate::store::{RelationStats, TripleStore};
use crate::triple::Triple;

#[derive(Debug, Clone)]
pub struct TransM {
    base: TransE,
    weights: Vec<f32>,
}

impl TransM {
    /// Initialize like [`TransE`] and read relation weights from `store`.
    pub fn new(store: &TripleStore, params: ModelParams) -> Self {
        let relations = store.relation_count();
        let weights = (0..relations)
            .map(|r| relation_weight(&store.relation_stats(r as u32)))
            .collect();
        Self {
            base: TransE::new(store.entity_count(), relations, params),
            weights,
        }
    }

    pub fn params(&self) -> &ModelParams {
        self.base.params()
    }

    /// θ for a relation.
    pub fn weight(&self, relation: u32) -> Result<f32> {
        self.weights.get(relation as usize).copied().ok_or_else(|| {
            Error::model(format!(
                "relation {relation} out of range ({} relations)",
                self.weights.len()
            ))
        })
    }
}

/// Relations unseen in training have no facts and get 1 / ln 2.
fn relation_weight(stats: &RelationStats) -> f32 {
    let facts = stats.facts as f64;
    let spread = facts / (1.0 + stats.tails as f64) + facts / (1.0 + stats.heads as f64);
    (1.0 / (2.0 + spread).ln()) as f32
}

impl ScoringModel for TransM {
    fn name(&self) -> &str {
        "TransM"
    }

    fn score(&self, triples: &[Triple]) -> Result<Vec<f32>> {
        triples
            .iter()
            .map(|t| Ok(-self.weight(t.relation)? * self.base.distance(t)?))
            .collect()
    }

    fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        let norm = self.base.params().norm;
        let margin = self.base.params().margin;
        let mut total = 0.0;
        let mut pairs = 0usize;

        for (pos, neg) in batch.pairs() {
            // Relations differ when the negative came from relation corruption.
            let (w_pos, w_neg) = (self.weight(pos.relation)?, self.weight(neg.relation)?);
            let pos_res = self.base.residual(&pos)?;
            let neg_res = self.base.residual(&neg)?;
            let (d_pos, d_neg) = (norm.distance(&pos_res), norm.distance(&neg_res));

            let loss = (margin + w_pos * d_pos - w_neg * d_neg).max(0.0);
            total += loss;
            pairs += 1;

            if loss > 0.0 {
                self.base.step(&pos, &pos_res, d_pos, w_pos);
                self.base.step(&neg, &neg_res, d_neg, -w_neg);
                self.base.renormalize(&pos, &neg);
            }
        }

        Ok(if pairs > 0 { total / pairs as f32 } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PositiveGroup;
    use crate::models::Norm;

    fn t(h: u32, r: u32, tail: u32) -> Triple {
        Triple::new(h, r, tail)
    }

    /// Relation 0 is one-to-one, relation 1 fans one head out to four tails.
    fn store() -> TripleStore {
        let mut train = vec![t(0, 0, 1), t(2, 0, 3)];
        train.extend((1..5).map(|tail| t(0, 1, tail)));
        TripleStore::new(6, 3, train, vec![], vec![]).unwrap()
    }

    #[test]
    fn test_weights_follow_mapping_degree() {
        let model = TransM::new(&store(), ModelParams::default().with_dim(8));

        // one-to-one: 2 facts, 2 heads, 2 tails
        let one_to_one = 1.0 / (2.0f64 + 2.0 / 3.0 + 2.0 / 3.0).ln();
        assert!((f64::from(model.weight(0).unwrap()) - one_to_one).abs() < 1e-6);
        // one-to-many: 4 facts, 1 head, 4 tails
        let one_to_many = 1.0 / (2.0f64 + 4.0 / 5.0 + 4.0 / 2.0).ln();
        assert!((f64::from(model.weight(1).unwrap()) - one_to_many).abs() < 1e-6);
        assert!(model.weight(1).unwrap() < model.weight(0).unwrap());
        // unseen in training
        let unseen = 1.0 / std::f64::consts::LN_2;
        assert!((f64::from(model.weight(2).unwrap()) - unseen).abs() < 1e-6);

        assert!(model.weight(3).is_err());
    }

    #[test]
    fn test_score_is_weighted_transe_score() {
        let store = store();
        let params = ModelParams::default()
            .with_dim(8)
            .with_norm(Norm::L1)
            .with_seed(13);
        let transm = TransM::new(&store, params);
        let transe = TransE::new(store.entity_count(), store.relation_count(), params);
        let q = [t(0, 0, 1), t(0, 1, 4), t(5, 2, 3)];

        let weighted = transm.score(&q).unwrap();
        let plain = transe.score(&q).unwrap();
        for (i, triple) in q.iter().enumerate() {
            let w = transm.weight(triple.relation).unwrap();
            assert!((weighted[i] - w * plain[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_training_separates_positive_from_negative() {
        let params = ModelParams::default()
            .with_dim(16)
            .with_learning_rate(0.05)
            .with_seed(21);
        let mut model = TransM::new(&store(), params);
        let pos = t(0, 1, 2);
        let neg = t(0, 1, 5);
        let batch = Batch {
            index: 0,
            groups: vec![PositiveGroup {
                positive: pos,
                negatives: vec![neg],
            }],
            requested_negatives: 1,
            underfilled: 0,
        };

        for _ in 0..200 {
            assert!(model.train_step(&batch).unwrap().is_finite());
        }
        let scores = model.score(&[pos, neg]).unwrap();
        assert!(scores[0] > scores[1]);
    }
}
