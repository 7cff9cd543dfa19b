//! Rank-based evaluation for knowledge graph embeddings.
//!
//! This module implements the standard link prediction protocol used by
//! FB15k-237, WN18RR and friends.
//!
//! # The Link Prediction Task
//!
//! Given a test triple (h, r, t):
//! 1. **Head prediction**: score every (e, r, t) for e in `0..num_entities`,
//!    rank the true head
//! 2. **Tail prediction**: score every (h, r, e), rank the true tail
//!
//! Both ranks go into the same population; MR, MRR and hits@K are computed
//! over `2 * num_test_triples` ranks.
//!
//! # Filtered vs Raw Metrics
//!
//! | Setting | Competitors | Use Case |
//! |---------|-------------|----------|
//! | Raw | every other candidate | Pessimistic estimate |
//! | Filtered | candidates not in train ∪ valid ∪ test | Standard benchmark |
//!
//! Raw penalizes a model for ranking *other* true facts above the one being
//! tested. The two variants are not comparable, so [`CorpusMetrics`] always
//! carries the policy it was computed under.
//!
//! # Ties
//!
//! Candidates are ordered by descending score (compared with
//! [`f32::total_cmp`]); equal scores are ordered by ascending entity index.
//! A competitor therefore outranks the truth iff its score is greater, or
//! equal with a smaller entity index. The rank is computed by counting
//! outranking competitors, which gives the same position as the sort in
//! O(num_entities).
//!
//! # References
//!
//! - Bordes et al. (2013): Original TransE evaluation
//! - Sun et al. (2020): "A Re-evaluation of Knowledge Graph Completion
//!   Methods" (why tie handling matters)

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::config::EvalConfig;
use crate::error::{Error, Result};
use crate::model::ScoringModel;
use crate::sampler::FilterPolicy;
use crate::store::{check_bounds, TripleStore};
use crate::triple::{Side, Split, SplitScope, Triple};

/// Ranks of one test triple under one filter policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankResult {
    pub triple: Triple,
    /// 1-based rank of the true head among head corruptions.
    pub head_rank: usize,
    /// 1-based rank of the true tail among tail corruptions.
    pub tail_rank: usize,
    /// Whether known triples were removed from the competition.
    pub filtered: bool,
}

/// MR, MRR and hits@K over a population of ranks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RankMetrics {
    /// Mean Rank: E\[rank\]
    pub mean_rank: f64,
    /// Mean Reciprocal Rank: E\[1/rank\]
    pub mean_reciprocal_rank: f64,
    /// (K, P(rank <= K)) in ascending K.
    pub hits_at: Vec<(usize, f64)>,
    /// Number of ranks aggregated.
    pub num_ranks: usize,
}

impl RankMetrics {
    /// Compute metrics from a list of ranks.
    ///
    /// `hits_at` is expected sorted and deduplicated.
    pub fn from_ranks(ranks: &[usize], hits_at: &[usize]) -> Self {
        if ranks.is_empty() {
            return Self {
                hits_at: hits_at.iter().map(|&k| (k, 0.0)).collect(),
                ..Self::default()
            };
        }

        let n = ranks.len() as f64;
        let mean_rank = ranks.iter().map(|&r| r as f64).sum::<f64>() / n;
        let mean_reciprocal_rank = ranks.iter().map(|&r| 1.0 / r as f64).sum::<f64>() / n;
        let hits_at = hits_at
            .iter()
            .map(|&k| (k, ranks.iter().filter(|&&r| r <= k).count() as f64 / n))
            .collect();

        Self {
            mean_rank,
            mean_reciprocal_rank,
            hits_at,
            num_ranks: ranks.len(),
        }
    }

    /// Hits@K, if K was configured.
    pub fn hits(&self, k: usize) -> Option<f64> {
        self.hits_at
            .iter()
            .find(|(threshold, _)| *threshold == k)
            .map(|&(_, v)| v)
    }

    /// Merge metrics from multiple evaluation runs, weighted by rank count.
    ///
    /// Only thresholds present in every input survive.
    pub fn merge(metrics: &[Self]) -> Self {
        let total: usize = metrics.iter().map(|m| m.num_ranks).sum();
        if total == 0 {
            return Self::default();
        }
        let total_f = total as f64;

        let hits_at = metrics[0]
            .hits_at
            .iter()
            .filter_map(|&(k, _)| {
                let mut sum = 0.0;
                for m in metrics {
                    sum += m.hits(k)? * m.num_ranks as f64;
                }
                Some((k, sum / total_f))
            })
            .collect();

        Self {
            mean_rank: weighted_mean(metrics, total_f, |m| m.mean_rank),
            mean_reciprocal_rank: weighted_mean(metrics, total_f, |m| m.mean_reciprocal_rank),
            hits_at,
            num_ranks: total,
        }
    }

    /// Format as summary string.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "MRR: {:.4} | MR: {:.1}",
            self.mean_reciprocal_rank, self.mean_rank
        );
        for (k, v) in &self.hits_at {
            out.push_str(&format!(" | H@{k}: {v:.3}"));
        }
        out.push_str(&format!(" (n={})", self.num_ranks));
        out
    }
}

fn weighted_mean(metrics: &[RankMetrics], total: f64, f: impl Fn(&RankMetrics) -> f64) -> f64 {
    metrics
        .iter()
        .map(|m| f(m) * m.num_ranks as f64)
        .sum::<f64>()
        / total
}

/// Corpus-level evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusMetrics {
    /// Policy the ranks were computed under. Raw and filtered are not comparable.
    pub filter_policy: FilterPolicy,
    /// Test triples evaluated.
    pub num_triples: usize,
    /// Head and tail ranks pooled together.
    pub combined: RankMetrics,
    /// Head prediction only.
    pub head: RankMetrics,
    /// Tail prediction only.
    pub tail: RankMetrics,
}

impl CorpusMetrics {
    /// Aggregate per-triple results. All results must share `filter_policy`.
    pub fn from_results(
        results: &[RankResult],
        filter_policy: FilterPolicy,
        hits_at: &[usize],
    ) -> Self {
        let head: Vec<usize> = results.iter().map(|r| r.head_rank).collect();
        let tail: Vec<usize> = results.iter().map(|r| r.tail_rank).collect();
        let combined: Vec<usize> = results
            .iter()
            .flat_map(|r| [r.head_rank, r.tail_rank])
            .collect();

        Self {
            filter_policy,
            num_triples: results.len(),
            combined: RankMetrics::from_ranks(&combined, hits_at),
            head: RankMetrics::from_ranks(&head, hits_at),
            tail: RankMetrics::from_ranks(&tail, hits_at),
        }
    }

    pub fn mean_rank(&self) -> f64 {
        self.combined.mean_rank
    }

    pub fn mean_reciprocal_rank(&self) -> f64 {
        self.combined.mean_reciprocal_rank
    }

    pub fn hits_at(&self, k: usize) -> Option<f64> {
        self.combined.hits(k)
    }

    pub fn summary(&self) -> String {
        format!("[{}] {}", self.filter_policy, self.combined.summary())
    }
}

/// Raw and filtered rank of one entity position, from a single scoring pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SideRanks {
    raw: usize,
    filtered: usize,
}

impl SideRanks {
    fn get(&self, policy: FilterPolicy) -> usize {
        match policy {
            FilterPolicy::Raw => self.raw,
            FilterPolicy::Filtered => self.filtered,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TripleRanks {
    triple: Triple,
    head: SideRanks,
    tail: SideRanks,
}

impl TripleRanks {
    fn result(&self, policy: FilterPolicy) -> RankResult {
        RankResult {
            triple: self.triple,
            head_rank: self.head.get(policy),
            tail_rank: self.tail.get(policy),
            filtered: policy == FilterPolicy::Filtered,
        }
    }
}

/// Link prediction evaluator.
///
/// Holds no mutable state: concurrent `evaluate` calls on one evaluator (or
/// several evaluators over one store) do not interfere.
///
/// # Example
///
/// ```rust,ignore
/// use kge_engine::{EvalConfig, RankEvaluator, Split};
///
/// let evaluator = RankEvaluator::new(store.clone(), EvalConfig::default())?;
/// let metrics = evaluator.evaluate(Split::Test, &model)?;
/// println!("{}", metrics.summary());
/// ```
#[derive(Debug, Clone)]
pub struct RankEvaluator {
    store: Arc<TripleStore>,
    filter_policy: FilterPolicy,
    hits_at: Vec<usize>,
    max_triples: Option<usize>,
    cancel: CancelToken,
}

impl RankEvaluator {
    pub fn new(store: Arc<TripleStore>, config: EvalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            filter_policy: config.filter_policy,
            hits_at: config.normalized_hits_at(),
            max_triples: config.max_triples,
            cancel: CancelToken::new(),
        })
    }

    /// Abort between triples once `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        self.filter_policy
    }

    pub fn hits_at(&self) -> &[usize] {
        &self.hits_at
    }

    /// Evaluate a split (normally valid or test) under the configured policy.
    pub fn evaluate<M: ScoringModel + ?Sized>(
        &self,
        split: Split,
        model: &M,
    ) -> Result<CorpusMetrics> {
        let metrics = self.evaluate_triples(self.limit(self.store.split(split)), model)?;
        log::info!("{} on {}: {}", model.name(), split, metrics.summary());
        Ok(metrics)
    }

    /// Evaluate arbitrary triples under the configured policy.
    pub fn evaluate_triples<M: ScoringModel + ?Sized>(
        &self,
        triples: &[Triple],
        model: &M,
    ) -> Result<CorpusMetrics> {
        let ranks = self.rank_all(triples, model)?;
        Ok(self.aggregate(&ranks, self.filter_policy))
    }

    /// Per-triple rank records under the configured policy.
    pub fn rank_results<M: ScoringModel + ?Sized>(
        &self,
        triples: &[Triple],
        model: &M,
    ) -> Result<Vec<RankResult>> {
        Ok(self
            .rank_all(triples, model)?
            .iter()
            .map(|r| r.result(self.filter_policy))
            .collect())
    }

    /// Rank a single triple under the configured policy.
    pub fn rank<M: ScoringModel + ?Sized>(&self, triple: Triple, model: &M) -> Result<RankResult> {
        let mut buf = Vec::with_capacity(self.store.entity_count());
        Ok(self
            .rank_triple(triple, model, &mut buf)?
            .result(self.filter_policy))
    }

    /// Raw and filtered metrics from one scoring pass per candidate set.
    ///
    /// Returns `(raw, filtered)` regardless of the configured policy.
    pub fn evaluate_raw_and_filtered<M: ScoringModel + ?Sized>(
        &self,
        split: Split,
        model: &M,
    ) -> Result<(CorpusMetrics, CorpusMetrics)> {
        let ranks = self.rank_all(self.limit(self.store.split(split)), model)?;
        Ok((
            self.aggregate(&ranks, FilterPolicy::Raw),
            self.aggregate(&ranks, FilterPolicy::Filtered),
        ))
    }

    /// [`evaluate`](Self::evaluate) with test triples ranked on the rayon pool.
    ///
    /// Ranks are gathered in split order before aggregation, so the result is
    /// bit-identical to the sequential path.
    #[cfg(feature = "parallel")]
    pub fn evaluate_parallel<M: ScoringModel + Sync + ?Sized>(
        &self,
        split: Split,
        model: &M,
    ) -> Result<CorpusMetrics> {
        use rayon::prelude::*;

        let triples = self.limit(self.store.split(split));
        let ranks = triples
            .par_iter()
            .map_init(
                || Vec::with_capacity(self.store.entity_count()),
                |buf, &triple| {
                    self.cancel.check()?;
                    self.rank_triple(triple, model, buf)
                },
            )
            .collect::<Result<Vec<_>>>()?;

        let metrics = self.aggregate(&ranks, self.filter_policy);
        log::info!("{} on {}: {}", model.name(), split, metrics.summary());
        Ok(metrics)
    }

    fn limit<'t>(&self, triples: &'t [Triple]) -> &'t [Triple] {
        match self.max_triples {
            Some(n) if n < triples.len() => &triples[..n],
            _ => triples,
        }
    }

    fn aggregate(&self, ranks: &[TripleRanks], policy: FilterPolicy) -> CorpusMetrics {
        let results: Vec<RankResult> = ranks.iter().map(|r| r.result(policy)).collect();
        CorpusMetrics::from_results(&results, policy, &self.hits_at)
    }

    fn rank_all<M: ScoringModel + ?Sized>(
        &self,
        triples: &[Triple],
        model: &M,
    ) -> Result<Vec<TripleRanks>> {
        let mut buf = Vec::with_capacity(self.store.entity_count());
        let mut ranks = Vec::with_capacity(triples.len());

        for &triple in triples {
            self.cancel.check()?;
            ranks.push(self.rank_triple(triple, model, &mut buf)?);
        }

        log::debug!("{}: ranked {} triples", model.name(), ranks.len());
        Ok(ranks)
    }

    fn rank_triple<M: ScoringModel + ?Sized>(
        &self,
        triple: Triple,
        model: &M,
        buf: &mut Vec<Triple>,
    ) -> Result<TripleRanks> {
        check_bounds(&triple, self.store.entity_count(), self.store.relation_count())?;
        Ok(TripleRanks {
            triple,
            head: self.rank_side(triple, Side::Head, model, buf)?,
            tail: self.rank_side(triple, Side::Tail, model, buf)?,
        })
    }

    fn rank_side<M: ScoringModel + ?Sized>(
        &self,
        triple: Triple,
        side: Side,
        model: &M,
        buf: &mut Vec<Triple>,
    ) -> Result<SideRanks> {
        let n = self.store.entity_count() as u32;
        buf.clear();
        buf.extend((0..n).map(|e| triple.with_entity(side, e)));

        let scores = model.score(buf)?;
        if scores.len() != buf.len() {
            return Err(Error::ScoreCountMismatch {
                expected: buf.len(),
                actual: scores.len(),
            });
        }

        let truth = triple.entity(side) as usize;
        let truth_score = scores[truth];
        let mut ranks = SideRanks {
            raw: 1,
            filtered: 1,
        };

        for (entity, (score, candidate)) in scores.iter().zip(buf.iter()).enumerate() {
            if entity == truth || !outranks(*score, entity, truth_score, truth) {
                continue;
            }
            ranks.raw += 1;
            if !self.store.contains(candidate, SplitScope::All) {
                ranks.filtered += 1;
            }
        }

        Ok(ranks)
    }
}

/// Whether a candidate sorts before the truth: higher score, or equal score
/// with a lower entity index.
#[inline]
fn outranks(score: f32, entity: usize, truth_score: f32, truth: usize) -> bool {
    match score.total_cmp(&truth_score) {
        Ordering::Greater => true,
        Ordering::Equal => entity < truth,
        Ordering::Less => false,
    }
}
