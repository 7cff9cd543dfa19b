//! Index-resolved triples and dataset splits.
//!
//! A [`Triple`] is three dense `u32` indices. It is `Copy`, hashes and
//! compares structurally, and packs into contiguous `Vec<Triple>` arenas
//! so candidate sets of `num_entities` triples stay cache friendly.

use serde::{Deserialize, Serialize};

/// Dense entity index in `[0, num_entities)`.
pub type EntityId = u32;

/// Dense relation index in `[0, num_relations)`.
pub type RelationId = u32;

/// A (head, relation, tail) fact with all three positions resolved to indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub head: EntityId,
    pub relation: RelationId,
    pub tail: EntityId,
}

impl Triple {
    pub const fn new(head: EntityId, relation: RelationId, tail: EntityId) -> Self {
        Self {
            head,
            relation,
            tail,
        }
    }

    /// Same triple with the head replaced.
    #[inline]
    pub const fn with_head(self, head: EntityId) -> Self {
        Self { head, ..self }
    }

    /// Same triple with the tail replaced.
    #[inline]
    pub const fn with_tail(self, tail: EntityId) -> Self {
        Self { tail, ..self }
    }

    /// Same triple with the relation replaced.
    #[inline]
    pub const fn with_relation(self, relation: RelationId) -> Self {
        Self { relation, ..self }
    }

    /// The entity at `side`.
    #[inline]
    pub const fn entity(&self, side: Side) -> EntityId {
        match side {
            Side::Head => self.head,
            Side::Tail => self.tail,
        }
    }

    /// Same triple with the entity at `side` replaced.
    #[inline]
    pub const fn with_entity(self, side: Side, entity: EntityId) -> Self {
        match side {
            Side::Head => self.with_head(entity),
            Side::Tail => self.with_tail(entity),
        }
    }
}

impl From<(EntityId, RelationId, EntityId)> for Triple {
    fn from((head, relation, tail): (EntityId, RelationId, EntityId)) -> Self {
        Self::new(head, relation, tail)
    }
}

impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.head, self.relation, self.tail)
    }
}

/// Entity position within a triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Head,
    Tail,
}

/// One of the three disjoint dataset splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Valid, Split::Test];

    pub(crate) const fn slot(self) -> usize {
        match self {
            Split::Train => 0,
            Split::Valid => 1,
            Split::Test => 2,
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => f.write_str("train"),
            Split::Valid => f.write_str("valid"),
            Split::Test => f.write_str("test"),
        }
    }
}

/// Membership scope for [`crate::TripleStore::contains`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitScope {
    Train,
    Valid,
    Test,
    /// Union of train, valid and test.
    All,
}

impl From<Split> for SplitScope {
    fn from(split: Split) -> Self {
        match split {
            Split::Train => SplitScope::Train,
            Split::Valid => SplitScope::Valid,
            Split::Test => SplitScope::Test,
        }
    }
}
