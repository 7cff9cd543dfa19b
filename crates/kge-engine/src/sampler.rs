//! Negative sampling by triple corruption.
//!
//! A negative is a positive triple with exactly one position replaced by a
//! uniformly drawn index. Under [`FilterPolicy::Filtered`] a candidate that is
//! itself a known triple (in any split) is rejected and redrawn.
//!
//! # Corruption modes
//!
//! | Mode | Replaced position |
//! |------|-------------------|
//! | `CorruptHead` | head |
//! | `CorruptTail` | tail |
//! | `CorruptBoth` | head or tail, fair coin per draw |
//! | `CorruptRelation` | relation |
//! | `Bernoulli` | head with probability tph / (tph + hpt), else tail |
//!
//! `Bernoulli` follows Wang et al. (2014), "Knowledge Graph Embedding by
//! Translating on Hyperplanes": for one-to-many relations corrupting the head
//! is far less likely to produce a false negative than corrupting the tail.
//!
//! # Termination
//!
//! Rejection sampling on a tiny or dense graph may never find k valid
//! negatives. Attempts are capped at `retry_factor * k`; when the cap is hit
//! the outcome carries fewer than k negatives and reports the shortfall.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::store::TripleStore;
use crate::triple::{Side, SplitScope, Triple};

/// Default multiple of k allowed as sampling attempts.
pub const DEFAULT_RETRY_FACTOR: usize = 10;

/// Which position of a positive triple gets replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionMode {
    CorruptHead,
    CorruptTail,
    CorruptBoth,
    CorruptRelation,
    Bernoulli,
}

impl Default for CorruptionMode {
    fn default() -> Self {
        CorruptionMode::CorruptBoth
    }
}

/// Whether known true triples are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterPolicy {
    /// Accept any candidate except the exact original triple.
    Raw,
    /// Reject candidates found anywhere in train ∪ valid ∪ test.
    Filtered,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        FilterPolicy::Filtered
    }
}

impl std::fmt::Display for FilterPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterPolicy::Raw => f.write_str("raw"),
            FilterPolicy::Filtered => f.write_str("filtered"),
        }
    }
}

/// Result of sampling negatives for one positive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOutcome {
    /// Accepted negatives, in draw order. May contain repeats.
    pub negatives: Vec<Triple>,
    /// Number of negatives asked for.
    pub requested: usize,
    /// Draws made, accepted or not.
    pub attempts: usize,
}

impl SampleOutcome {
    /// True when all `requested` negatives were produced.
    pub fn is_complete(&self) -> bool {
        self.negatives.len() >= self.requested
    }

    /// How many negatives are missing.
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.negatives.len())
    }
}

/// Corrupts positives against a [`TripleStore`].
#[derive(Debug, Clone, Copy)]
pub struct NegativeSampler<'a> {
    store: &'a TripleStore,
    retry_factor: usize,
}

impl<'a> NegativeSampler<'a> {
    pub fn new(store: &'a TripleStore) -> Self {
        Self {
            store,
            retry_factor: DEFAULT_RETRY_FACTOR,
        }
    }

    /// Cap attempts at `factor * k` (minimum 1).
    pub fn with_retry_factor(mut self, factor: usize) -> Self {
        self.retry_factor = factor.max(1);
        self
    }

    pub fn retry_factor(&self) -> usize {
        self.retry_factor
    }

    /// Draw up to `k` negatives for `positive`.
    ///
    /// The only source of randomness is `rng`, so a seeded RNG makes the
    /// outcome reproducible.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        positive: Triple,
        k: usize,
        mode: CorruptionMode,
        policy: FilterPolicy,
        rng: &mut R,
    ) -> SampleOutcome {
        let mut outcome = SampleOutcome {
            negatives: Vec::with_capacity(k),
            requested: k,
            attempts: 0,
        };

        // A one-element index space has nothing to swap in.
        if k == 0 || self.space(mode) < 2 {
            return outcome;
        }

        let max_attempts = k.saturating_mul(self.retry_factor);
        while outcome.negatives.len() < k && outcome.attempts < max_attempts {
            outcome.attempts += 1;
            let candidate = self.corrupt(positive, mode, rng);
            if self.accepts(&candidate, &positive, policy) {
                outcome.negatives.push(candidate);
            }
        }

        if !outcome.is_complete() {
            log::debug!(
                "sampled {}/{} negatives for {} after {} attempts",
                outcome.negatives.len(),
                k,
                positive,
                outcome.attempts
            );
        }

        outcome
    }

    fn space(&self, mode: CorruptionMode) -> usize {
        match mode {
            CorruptionMode::CorruptRelation => self.store.relation_count(),
            _ => self.store.entity_count(),
        }
    }

    fn accepts(&self, candidate: &Triple, positive: &Triple, policy: FilterPolicy) -> bool {
        if candidate == positive {
            return false;
        }
        match policy {
            FilterPolicy::Raw => true,
            FilterPolicy::Filtered => !self.store.contains(candidate, SplitScope::All),
        }
    }

    fn corrupt<R: Rng + ?Sized>(
        &self,
        positive: Triple,
        mode: CorruptionMode,
        rng: &mut R,
    ) -> Triple {
        match mode {
            CorruptionMode::CorruptHead => self.corrupt_side(positive, Side::Head, rng),
            CorruptionMode::CorruptTail => self.corrupt_side(positive, Side::Tail, rng),
            CorruptionMode::CorruptBoth => {
                let side = if rng.gen_bool(0.5) { Side::Head } else { Side::Tail };
                self.corrupt_side(positive, side, rng)
            }
            CorruptionMode::Bernoulli => {
                let p = self
                    .store
                    .relation_stats(positive.relation)
                    .head_corruption_prob();
                let side = if rng.gen_bool(p) { Side::Head } else { Side::Tail };
                self.corrupt_side(positive, side, rng)
            }
            CorruptionMode::CorruptRelation => {
                let relation =
                    draw_excluding(rng, self.store.relation_count(), positive.relation);
                positive.with_relation(relation)
            }
        }
    }

    fn corrupt_side<R: Rng + ?Sized>(&self, positive: Triple, side: Side, rng: &mut R) -> Triple {
        let entity = draw_excluding(rng, self.store.entity_count(), positive.entity(side));
        positive.with_entity(side, entity)
    }
}

/// Uniform draw from `[0, space)` excluding `original`.
///
/// Draws from a range one shorter and shifts past the excluded value, so a
/// single draw always suffices. Requires `space >= 2`.
fn draw_excluding<R: Rng + ?Sized>(rng: &mut R, space: usize, original: u32) -> u32 {
    let space = space as u32;
    if original >= space {
        return rng.gen_range(0..space);
    }
    let v = rng.gen_range(0..space - 1);
    if v >= original {
        v + 1
    } else {
        v
    }
}
