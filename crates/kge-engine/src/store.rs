//! Immutable, indexed triple storage for train/valid/test splits.
//!
//! Each split is kept twice: as a contiguous `Vec<Triple>` for iteration and
//! shuffling, and as a hash set for O(1) membership. The union of all three
//! splits backs filtered sampling and filtered evaluation, where a triple
//! known from *any* split must never be treated as a negative.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, IndexKind, Result};
use crate::triple::{RelationId, Split, SplitScope, Triple};

/// Per-relation cardinality statistics over the training split.
///
/// `tails_per_head` (tph) is the average number of distinct tails each head
/// has under the relation; `heads_per_tail` (hpt) the converse.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RelationStats {
    pub tails_per_head: f64,
    pub heads_per_tail: f64,
    /// Training triples using the relation.
    pub facts: usize,
    /// Distinct heads seen with the relation.
    pub heads: usize,
    /// Distinct tails seen with the relation.
    pub tails: usize,
}

impl RelationStats {
    /// Probability of corrupting the head for Bernoulli negative sampling.
    ///
    /// One-to-many relations (high tph) corrupt the head more often, which
    /// makes it less likely to produce a false negative.
    pub fn head_corruption_prob(&self) -> f64 {
        let total = self.tails_per_head + self.heads_per_tail;
        if total > 0.0 {
            self.tails_per_head / total
        } else {
            0.5
        }
    }
}

/// Counts gathered while building a [`TripleStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub train: usize,
    pub valid: usize,
    pub test: usize,
    /// Triples repeated within the same split.
    pub duplicates_dropped: usize,
    /// Triples already claimed by an earlier split (train before valid before test).
    pub cross_split_dropped: usize,
}

/// Read-only view over the three dataset splits.
#[derive(Debug, Clone)]
pub struct TripleStore {
    num_entities: usize,
    num_relations: usize,
    splits: [Vec<Triple>; 3],
    index: [HashSet<Triple>; 3],
    all: HashSet<Triple>,
    relation_stats: HashMap<RelationId, RelationStats>,
    stats: StoreStats,
}

impl TripleStore {
    /// Build a store from index-resolved splits.
    ///
    /// Fails with [`Error::InvalidIndex`] if any triple references an index
    /// outside `num_entities` / `num_relations`.
    pub fn new(
        num_entities: usize,
        num_relations: usize,
        train: impl IntoIterator<Item = Triple>,
        valid: impl IntoIterator<Item = Triple>,
        test: impl IntoIterator<Item = Triple>,
    ) -> Result<Self> {
        let mut splits: [Vec<Triple>; 3] = Default::default();
        let mut index: [HashSet<Triple>; 3] = Default::default();
        let mut all = HashSet::new();
        let mut stats = StoreStats::default();

        let inputs: [Vec<Triple>; 3] = [
            train.into_iter().collect(),
            valid.into_iter().collect(),
            test.into_iter().collect(),
        ];

        for (slot, input) in inputs.into_iter().enumerate() {
            for triple in input {
                check_bounds(&triple, num_entities, num_relations)?;

                if index[slot].contains(&triple) {
                    stats.duplicates_dropped += 1;
                    continue;
                }
                if !all.insert(triple) {
                    stats.cross_split_dropped += 1;
                    continue;
                }
                index[slot].insert(triple);
                splits[slot].push(triple);
            }
        }

        stats.train = splits[0].len();
        stats.valid = splits[1].len();
        stats.test = splits[2].len();

        if stats.duplicates_dropped > 0 || stats.cross_split_dropped > 0 {
            log::warn!(
                "dropped {} duplicate and {} cross-split triples while building store",
                stats.duplicates_dropped,
                stats.cross_split_dropped
            );
        }

        let relation_stats = compute_relation_stats(&splits[0]);

        Ok(Self {
            num_entities,
            num_relations,
            splits,
            index,
            all,
            relation_stats,
            stats,
        })
    }

    /// Number of entities (size of the head/tail index space).
    pub fn entity_count(&self) -> usize {
        self.num_entities
    }

    /// Number of relations.
    pub fn relation_count(&self) -> usize {
        self.num_relations
    }

    /// O(1) membership test.
    pub fn contains(&self, triple: &Triple, scope: SplitScope) -> bool {
        match scope {
            SplitScope::Train => self.index[0].contains(triple),
            SplitScope::Valid => self.index[1].contains(triple),
            SplitScope::Test => self.index[2].contains(triple),
            SplitScope::All => self.all.contains(triple),
        }
    }

    /// Lazily iterate a split. Each call starts from the beginning.
    pub fn iter(&self, split: Split) -> impl Iterator<Item = Triple> + '_ {
        self.splits[split.slot()].iter().copied()
    }

    /// The split as a contiguous slice, in insertion order.
    pub fn split(&self, split: Split) -> &[Triple] {
        &self.splits[split.slot()]
    }

    pub fn len(&self, split: Split) -> usize {
        self.splits[split.slot()].len()
    }

    /// Total number of distinct known triples.
    pub fn total_len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Training-split cardinality statistics for a relation.
    ///
    /// Relations that never occur in training get all-zero stats.
    pub fn relation_stats(&self, relation: RelationId) -> RelationStats {
        self.relation_stats
            .get(&relation)
            .copied()
            .unwrap_or_default()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }
}

pub(crate) fn check_bounds(
    triple: &Triple,
    num_entities: usize,
    num_relations: usize,
) -> Result<()> {
    let checks = [
        (IndexKind::Entity, triple.head, num_entities),
        (IndexKind::Relation, triple.relation, num_relations),
        (IndexKind::Entity, triple.tail, num_entities),
    ];
    for (kind, index, bound) in checks {
        if index as usize >= bound {
            return Err(Error::InvalidIndex {
                kind,
                index,
                bound,
                triple: *triple,
            });
        }
    }
    Ok(())
}

fn compute_relation_stats(train: &[Triple]) -> HashMap<RelationId, RelationStats> {
    // relation -> head -> distinct tails, relation -> tail -> distinct heads
    let mut tails_of: HashMap<RelationId, HashMap<u32, usize>> = HashMap::new();
    let mut heads_of: HashMap<RelationId, HashMap<u32, usize>> = HashMap::new();

    // `train` is already deduplicated, so each (h, r, t) counts once.
    for t in train {
        *tails_of
            .entry(t.relation)
            .or_default()
            .entry(t.head)
            .or_default() += 1;
        *heads_of
            .entry(t.relation)
            .or_default()
            .entry(t.tail)
            .or_default() += 1;
    }

    tails_of
        .iter()
        .map(|(&relation, per_head)| {
            let distinct_tails = heads_of.get(&relation).map_or(1, HashMap::len);
            let facts: usize = per_head.values().sum();
            (
                relation,
                RelationStats {
                    tails_per_head: facts as f64 / per_head.len() as f64,
                    heads_per_tail: facts as f64 / distinct_tails as f64,
                    facts,
                    heads: per_head.len(),
                    tails: distinct_tails,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, r: u32, tail: u32) -> Triple {
        Triple::new(h, r, tail)
    }

    fn small_store() -> TripleStore {
        TripleStore::new(
            4,
            1,
            vec![t(0, 0, 1), t(1, 0, 2)],
            vec![t(0, 0, 2)],
            vec![t(2, 0, 3)],
        )
        .unwrap()
    }

    #[test]
    fn test_membership_by_scope() {
        let store = small_store();

        assert!(store.contains(&t(0, 0, 1), SplitScope::Train));
        assert!(!store.contains(&t(0, 0, 1), SplitScope::Test));
        assert!(store.contains(&t(2, 0, 3), SplitScope::Test));
        assert!(!store.contains(&t(2, 0, 3), SplitScope::Train));
        assert!(store.contains(&t(0, 0, 2), SplitScope::Valid));

        for triple in [t(0, 0, 1), t(1, 0, 2), t(0, 0, 2), t(2, 0, 3)] {
            assert!(store.contains(&triple, SplitScope::All));
        }
        assert!(!store.contains(&t(3, 0, 0), SplitScope::All));
    }

    #[test]
    fn test_counts() {
        let store = small_store();
        assert_eq!(store.entity_count(), 4);
        assert_eq!(store.relation_count(), 1);
        assert_eq!(store.len(Split::Train), 2);
        assert_eq!(store.total_len(), 4);
    }

    #[test]
    fn test_iter_is_restartable() {
        let store = small_store();
        let first: Vec<_> = store.iter(Split::Train).collect();
        let second: Vec<_> = store.iter(Split::Train).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![t(0, 0, 1), t(1, 0, 2)]);
    }

    #[test]
    fn test_invalid_entity_index() {
        let err = TripleStore::new(3, 1, vec![t(0, 0, 3)], vec![], vec![]).unwrap_err();
        match err {
            Error::InvalidIndex {
                kind, index, bound, ..
            } => {
                assert_eq!(kind, IndexKind::Entity);
                assert_eq!(index, 3);
                assert_eq!(bound, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_relation_index_in_test_split() {
        let err = TripleStore::new(3, 1, vec![], vec![], vec![t(0, 1, 2)]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidIndex {
                kind: IndexKind::Relation,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicates_and_overlap_dropped() {
        let store = TripleStore::new(
            3,
            1,
            vec![t(0, 0, 1), t(0, 0, 1)],
            vec![t(0, 0, 1), t(1, 0, 2)],
            vec![],
        )
        .unwrap();

        let stats = store.stats();
        assert_eq!(stats.duplicates_dropped, 1);
        assert_eq!(stats.cross_split_dropped, 1);
        assert_eq!(store.split(Split::Train), &[t(0, 0, 1)]);
        assert_eq!(store.split(Split::Valid), &[t(1, 0, 2)]);
        assert!(!store.contains(&t(0, 0, 1), SplitScope::Valid));
    }

    #[test]
    fn test_relation_stats() {
        // relation 0: head 0 -> {1, 2, 3}  (one-to-many)
        let store = TripleStore::new(
            4,
            2,
            vec![t(0, 0, 1), t(0, 0, 2), t(0, 0, 3)],
            vec![],
            vec![],
        )
        .unwrap();

        let stats = store.relation_stats(0);
        assert!((stats.tails_per_head - 3.0).abs() < 1e-12);
        assert!((stats.heads_per_tail - 1.0).abs() < 1e-12);
        assert!((stats.head_corruption_prob() - 0.75).abs() < 1e-12);
        assert_eq!((stats.facts, stats.heads, stats.tails), (3, 1, 3));

        // Unseen relation falls back to an unbiased coin.
        let unseen = store.relation_stats(1);
        assert_eq!(unseen, RelationStats::default());
        assert!((unseen.head_corruption_prob() - 0.5).abs() < 1e-12);
    }
}
