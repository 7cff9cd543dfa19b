//! TransR: entities and relations in separate spaces (Lin et al. 2015).
//!
//! Each relation owns a `k × d` projection matrix Mᵣ that maps entity
//! embeddings (dimension `k`) into its relation space (dimension `d`):
//!
//! ```text
//! score = -‖h Mᵣ + r - t Mᵣ‖
//! ```
//!
//! Projections start as the rectangular identity, so an untrained TransR
//! with `k == d` scores like TransE over the same embeddings.

use super::{seeded_rng, EmbeddingTable, ModelParams};
use crate::batch::Batch;
use crate::error::Result;
use crate::model::ScoringModel;
use crate::triple::Triple;

#[derive(Debug, Clone)]
pub struct TransR {
    entities: EmbeddingTable,
    relations: EmbeddingTable,
    /// Row `r` holds Mᵣ row-major: entry (i, j) at `i * relation_dim + j`.
    projections: EmbeddingTable,
    entity_dim: usize,
    relation_dim: usize,
    params: ModelParams,
}

/// `(h - t)` in entity space and `(h - t) Mᵣ + r` in relation space.
struct Residual {
    diff: Vec<f32>,
    value: Vec<f32>,
}

impl TransR {
    pub fn new(num_entities: usize, num_relations: usize, params: ModelParams) -> Self {
        let entity_dim = params.dim;
        let relation_dim = params.relation_dim.unwrap_or(params.dim);
        let mut rng = seeded_rng(params.seed);
        Self {
            entities: EmbeddingTable::uniform(num_entities, entity_dim, &mut rng, true),
            relations: EmbeddingTable::uniform(num_relations, relation_dim, &mut rng, true),
            projections: EmbeddingTable::identity(num_relations, entity_dim, relation_dim),
            entity_dim,
            relation_dim,
            params,
        }
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    /// `x Mᵣ` for an entity-space vector.
    fn project(&self, x: &[f32], matrix: &[f32]) -> Vec<f32> {
        let d = self.relation_dim;
        (0..d)
            .map(|j| x.iter().enumerate().map(|(i, x)| x * matrix[i * d + j]).sum())
            .collect()
    }

    fn residual(&self, triple: &Triple) -> Result<Residual> {
        let h = self.entities.row(triple.head as usize)?;
        let t = self.entities.row(triple.tail as usize)?;
        let r = self.relations.row(triple.relation as usize)?;
        let matrix = self.projections.row(triple.relation as usize)?;

        let diff: Vec<f32> = h.iter().zip(t).map(|(h, t)| h - t).collect();
        let mut value = self.project(&diff, matrix);
        for (v, r) in value.iter_mut().zip(r) {
            *v += r;
        }
        Ok(Residual { diff, value })
    }

    /// Apply `-weight * lr * ∂d/∂·` to h, t, r and Mᵣ.
    fn step(
        &mut self,
        triple: &Triple,
        residual: &Residual,
        distance: f32,
        weight: f32,
    ) -> Result<()> {
        let (k, d) = (self.entity_dim, self.relation_dim);
        let g = self.params.norm.gradient(&residual.value, distance);
        let relation = triple.relation as usize;

        // ∂/∂h = Mᵣ g, ∂/∂t = -Mᵣ g, ∂/∂Mᵣ[i][j] = (h - t)ᵢ gⱼ
        let matrix = self.projections.row(relation)?;
        let grad_entity: Vec<f32> = (0..k)
            .map(|i| (0..d).map(|j| matrix[i * d + j] * g[j]).sum())
            .collect();
        let grad_matrix: Vec<f32> = residual
            .diff
            .iter()
            .flat_map(|&x| g.iter().map(move |g| x * g))
            .collect();

        let alpha = -weight * self.params.learning_rate;
        self.entities.add_scaled(triple.head as usize, &grad_entity, alpha);
        self.entities.add_scaled(triple.tail as usize, &grad_entity, -alpha);
        self.relations.add_scaled(relation, &g, alpha);
        self.projections.add_scaled(relation, &grad_matrix, alpha);
        Ok(())
    }
}

impl ScoringModel for TransR {
    fn name(&self) -> &str {
        "TransR"
    }

    fn score(&self, triples: &[Triple]) -> Result<Vec<f32>> {
        let norm = self.params.norm;
        triples
            .iter()
            .map(|t| self.residual(t).map(|res| -norm.distance(&res.value)))
            .collect()
    }

    fn train_step(&mut self, batch: &Batch) -> Result<f32> {
        let norm = self.params.norm;
        let mut total = 0.0;
        let mut pairs = 0usize;

        for (pos, neg) in batch.pairs() {
            let pos_res = self.residual(&pos)?;
            let neg_res = self.residual(&neg)?;
            let (d_pos, d_neg) = (norm.distance(&pos_res.value), norm.distance(&neg_res.value));

            let loss = (self.params.margin + d_pos - d_neg).max(0.0);
            total += loss;
            pairs += 1;

            if loss > 0.0 {
                self.step(&pos, &pos_res, d_pos, 1.0)?;
                self.step(&neg, &neg_res, d_neg, -1.0)?;
                for e in [pos.head, pos.tail, neg.head, neg.tail] {
                    self.entities.normalize_row(e as usize);
                }
            }
        }

        Ok(if pairs > 0 { total / pairs as f32 } else { 0.0 })
    }
}
