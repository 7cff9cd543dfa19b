//! DistMult: bilinear diagonal scoring (Yang et al. 2015).
//!
//! Score = Σ hᵢ rᵢ tᵢ. Symmetric in head and tail, so it cannot tell
//! (h, r, t) from (t, r, h).

use super::{seeded_rng, EmbeddingTable, ModelParams};
use crate::batch::Batch;
use crate::error::Result;
use crate::model::ScoringModel;
use crate::triple::Triple;

#[derive(Debug, Clone)]
pub struct DistMult {
    entities: EmbeddingTable,
    relations: EmbeddingTable,
    params: ModelParams,
}

impl DistMult {
    pub fn new(num_entities: usize, num_relations: usize, params: ModelParams) -> Self {
        let mut rng = seeded_rng(params.seed);
        Self {
            entities: EmbeddingTable::uniform(num_entities, params.dim, &mut rng, true),
            relations: EmbeddingTable::uniform(num_relations, params.dim, &mut rng, false),
            params,
        }
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    fn rows(&self, triple: &Triple) -> Result<(Vec<f32>, Vec<f32>, Vec<f32>)> {
        Ok((
            self.entities.row(triple.head as usize)?.to_vec(),
            self.relations.row(triple.relation as usize)?.to_vec(),
            self.entities.row(triple.tail as usize)?.to_vec(),
        ))
    }

    /// Gradient ascent (`sign = 1`) or descent (`sign = -1`) on the score.
    fn step(&mut self, triple: &Triple, (h, r, t): &(Vec<f32>, Vec<f32>, Vec<f32>), sign: f32) {
        let alpha = sign * self.params.learning_rate;
        let grad_h: Vec<f32> = r.iter().zip(t).map(|(r, t)| r * t).collect();
        let grad_r: Vec<f32> = h.iter().zip(t).map(|(h, t)| h * t).collect();
        let grad_t: Vec<f32> = h.iter().zip(r).map(|(h, r)| h * r).collect();
        self.entities.add_scaled(triple.head as usize, &grad_h, alpha);
        self.relations.add_scaled(triple.relation as usize, &grad_r, alpha);
        self.entities.add_scaled(triple.tail as usize, &grad_t, alpha);
    }
}

fn trilinear((h, r, t): &(Vec<f32>, Vec<f32>, Vec<f32>)) -> f32 {
    h.iter().zip(r).zip(t).map(|((h, r), t)| h * r * t).sum()
}

impl ScoringModel for DistMult {
    fn name(&self) -> &str {
        "DistMult"
    }

    fn score(&self, triples: &[Triple]) -> Result<Vec<f32>> {
        triples
            .iter()
            .map(|t| self.rows(t).map(|rows| trilinear(&rows)))
            .collect()
    }

    fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        let mut total = 0.0;
        let mut pairs = 0usize;

        for (pos, neg) in batch.pairs() {
            let pos_rows = self.rows(&pos)?;
            let neg_rows = self.rows(&neg)?;
            let loss = (self.params.margin - trilinear(&pos_rows) + trilinear(&neg_rows)).max(0.0);
            total += loss;
            pairs += 1;

            if loss > 0.0 {
                self.step(&pos, &pos_rows, 1.0);
                self.step(&neg, &neg_rows, -1.0);
                for e in [pos.head, pos.tail, neg.head, neg.tail] {
                    self.entities.normalize_row(e as usize);
                }
            }
        }

        Ok(if pairs > 0 { total / pairs as f32 } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PositiveGroup;

    #[test]
    fn test_score_is_symmetric() {
        let model = DistMult::new(4, 1, ModelParams::default().with_dim(8));
        let scores = model
            .score(&[Triple::new(0, 0, 3), Triple::new(3, 0, 0)])
            .unwrap();
        assert!((scores[0] - scores[1]).abs() < 1e-6);
    }

    #[test]
    fn test_training_raises_positive_score() {
        let params = ModelParams::default()
            .with_dim(16)
            .with_learning_rate(0.1)
            .with_seed(11);
        let mut model = DistMult::new(4, 1, params);
        let pos = Triple::new(0, 0, 1);
        let neg = Triple::new(0, 0, 2);
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

    #[test]
    fn test_empty_batch_zero_loss() {
        let mut model = DistMult::new(2, 1, ModelParams::default().with_dim(4));
        let batch = Batch {
            index: 0,
            groups: vec![],
            requested_negatives: 1,
            underfilled: 0,
        };
        assert_eq!(model.train_step(&batch).unwrap(), 0.0);
    }
}
