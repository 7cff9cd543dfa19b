//! Reference [`ScoringModel`] implementations.
//!
//! These exist to drive the engine end to end; the engine itself never
//! depends on a particular scoring function.
//!
//! # Available Models
//!
//! | Model | Score | Properties |
//! |-------|-------|------------|
//! | [`TransE`] | -‖h + r - t‖ | Relations as translations |
//! | [`TransR`] | -‖hMᵣ + r - tMᵣ‖ | Per-relation projection space |
//! | [`TransM`] | -θᵣ ‖h + r - t‖ | Fixed weight per relation from mapping degree |
//! | [`DistMult`] | Σ hᵢ rᵢ tᵢ | Bilinear diagonal, symmetric |
//!
//! The translational models measure distance with the configured [`Norm`].
//! All of them train with the margin ranking loss over (positive, negative)
//! pairs from a [`Batch`](crate::Batch):
//!
//! ```text
//! L = Σ max(0, margin - s(pos) + s(neg))
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use kge_engine::models::{ModelKind, ModelParams};
//!
//! // Pick the variant at construction time; everything downstream sees the trait.
//! let mut model = ModelKind::TransE.build(&store, ModelParams::default());
//! trainer.fit(&mut model)?;
//! ```

mod distmult;
mod transe;
mod transm;
mod transr;

pub use distmult::DistMult;
pub use transe::TransE;
pub use transm::TransM;
pub use transr::TransR;

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::ScoringModel;
use crate::store::TripleStore;

/// Distance used by the translational models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    /// Σ |xᵢ|
    L1,
    /// √(Σ xᵢ²)
    #[default]
    L2,
}

impl Norm {
    pub fn distance(self, v: &[f32]) -> f32 {
        match self {
            Norm::L1 => v.iter().map(|x| x.abs()).sum(),
            Norm::L2 => v.iter().map(|x| x * x).sum::<f32>().sqrt(),
        }
    }

    /// ∂distance/∂x at `v`, given `distance = self.distance(v)`.
    ///
    /// Zero where the norm is not differentiable.
    pub(crate) fn gradient(self, v: &[f32], distance: f32) -> Vec<f32> {
        match self {
            Norm::L1 => v
                .iter()
                .map(|&x| if x == 0.0 { 0.0 } else { x.signum() })
                .collect(),
            Norm::L2 => {
                let scale = if distance > 1e-8 { 1.0 / distance } else { 0.0 };
                v.iter().map(|x| x * scale).collect()
            }
        }
    }
}

/// Hyperparameters shared by the reference models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    /// Embedding dimension (default: 50).
    pub dim: usize,
    /// Relation space dimension for TransR (default: same as `dim`).
    pub relation_dim: Option<usize>,
    /// SGD learning rate (default: 0.01).
    pub learning_rate: f32,
    /// Ranking loss margin (default: 1.0).
    pub margin: f32,
    /// Distance for TransE, TransR and TransM (default: L2).
    pub norm: Norm,
    /// Initialization seed (default: 42).
    pub seed: u64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            dim: 50,
            relation_dim: None,
            learning_rate: 0.01,
            margin: 1.0,
            norm: Norm::L2,
            seed: 42,
        }
    }
}

impl ModelParams {
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_norm(mut self, norm: Norm) -> Self {
        self.norm = norm;
        self
    }

    pub fn with_relation_dim(mut self, dim: usize) -> Self {
        self.relation_dim = Some(dim);
        self
    }
}

/// Model variant selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    TransE,
    TransR,
    TransM,
    DistMult,
}

impl ModelKind {
    /// Build a model sized for `store`.
    ///
    /// TransM also reads its relation weights from the training split.
    pub fn build(
        self,
        store: &TripleStore,
        params: ModelParams,
    ) -> Box<dyn ScoringModel + Send + Sync> {
        let (entities, relations) = (store.entity_count(), store.relation_count());
        match self {
            ModelKind::TransE => Box::new(TransE::new(entities, relations, params)),
            ModelKind::TransR => Box::new(TransR::new(entities, relations, params)),
            ModelKind::TransM => Box::new(TransM::new(store, params)),
            ModelKind::DistMult => Box::new(DistMult::new(entities, relations, params)),
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "transe" => Ok(ModelKind::TransE),
            "transr" => Ok(ModelKind::TransR),
            "transm" => Ok(ModelKind::TransM),
            "distmult" => Ok(ModelKind::DistMult),
            other => Err(Error::invalid_config(format!("unknown model: {other}"))),
        }
    }
}

/// Row-major embedding matrix in one contiguous buffer.
#[derive(Debug, Clone)]
pub(crate) struct EmbeddingTable {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingTable {
    /// Uniform init in ±6/√dim (Bordes et al. 2013), optionally unit-normalized.
    pub(crate) fn uniform(rows: usize, dim: usize, rng: &mut XorShiftRng, normalize: bool) -> Self {
        let bound = 6.0 / (dim.max(1) as f32).sqrt();
        let data = (0..rows * dim).map(|_| rng.gen_range(-bound..bound)).collect();
        let mut table = Self { dim, data };
        if normalize {
            for row in 0..rows {
                table.normalize_row(row);
            }
        }
        table
    }

    /// One `rows × cols` matrix per row, each set to the rectangular identity.
    pub(crate) fn identity(count: usize, rows: usize, cols: usize) -> Self {
        let mut data = vec![0.0; count * rows * cols];
        for matrix in data.chunks_exact_mut((rows * cols).max(1)) {
            for i in 0..rows.min(cols) {
                matrix[i * cols + i] = 1.0;
            }
        }
        Self {
            dim: rows * cols,
            data,
        }
    }

    pub(crate) fn rows(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub(crate) fn row(&self, i: usize) -> Result<&[f32]> {
        let start = i * self.dim;
        self.data.get(start..start + self.dim).ok_or_else(|| {
            Error::model(format!(
                "embedding row {i} out of range ({} rows)",
                self.rows()
            ))
        })
    }

    /// `row += alpha * delta`
    pub(crate) fn add_scaled(&mut self, i: usize, delta: &[f32], alpha: f32) {
        let start = i * self.dim;
        for (x, d) in self.data[start..start + self.dim].iter_mut().zip(delta) {
            *x += alpha * d;
        }
    }

    /// Project the row onto the unit sphere.
    pub(crate) fn normalize_row(&mut self, i: usize) {
        let start = i * self.dim;
        let row = &mut self.data[start..start + self.dim];
        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-8 {
            row.iter_mut().for_each(|x| *x /= norm);
        }
    }
}

pub(crate) fn seeded_rng(seed: u64) -> XorShiftRng {
    XorShiftRng::seed_from_u64(seed)
}
