//! String id ↔ dense index mapping.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::store::TripleStore;
use crate::triple::{EntityId, RelationId, Triple};

/// Bijective name ↔ index tables for entities and relations.
///
/// Indices are assigned in order of first appearance (head before tail)
/// across train, then valid, then test, so the same corpus always yields
/// the same mapping.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    entity_to_idx: HashMap<String, EntityId>,
    idx_to_entity: Vec<String>,
    relation_to_idx: HashMap<String, RelationId>,
    idx_to_relation: Vec<String>,
}

impl Vocabulary {
    /// Build the mapping from every split of the corpus.
    pub fn build<'a, I>(splits: impl IntoIterator<Item = I>) -> Self
    where
        I: IntoIterator<Item = &'a (String, String, String)>,
    {
        let mut vocab = Self::default();
        for split in splits {
            for (h, r, t) in split {
                vocab.intern_entity(h);
                vocab.intern_relation(r);
                vocab.intern_entity(t);
            }
        }
        vocab
    }

    fn intern_entity(&mut self, name: &str) {
        if !self.entity_to_idx.contains_key(name) {
            self.entity_to_idx
                .insert(name.to_owned(), self.idx_to_entity.len() as EntityId);
            self.idx_to_entity.push(name.to_owned());
        }
    }

    fn intern_relation(&mut self, name: &str) {
        if !self.relation_to_idx.contains_key(name) {
            self.relation_to_idx
                .insert(name.to_owned(), self.idx_to_relation.len() as RelationId);
            self.idx_to_relation.push(name.to_owned());
        }
    }

    pub fn entity_count(&self) -> usize {
        self.idx_to_entity.len()
    }

    pub fn relation_count(&self) -> usize {
        self.idx_to_relation.len()
    }

    pub fn entity_id(&self, name: &str) -> Result<EntityId> {
        self.entity_to_idx
            .get(name)
            .copied()
            .ok_or_else(|| Error::EntityNotFound(name.to_owned()))
    }

    pub fn relation_id(&self, name: &str) -> Result<RelationId> {
        self.relation_to_idx
            .get(name)
            .copied()
            .ok_or_else(|| Error::RelationNotFound(name.to_owned()))
    }

    pub fn entity_name(&self, id: EntityId) -> Option<&str> {
        self.idx_to_entity.get(id as usize).map(String::as_str)
    }

    pub fn relation_name(&self, id: RelationId) -> Option<&str> {
        self.idx_to_relation.get(id as usize).map(String::as_str)
    }

    /// Map a named triple to indices.
    pub fn resolve(&self, head: &str, relation: &str, tail: &str) -> Result<Triple> {
        Ok(Triple::new(
            self.entity_id(head)?,
            self.relation_id(relation)?,
            self.entity_id(tail)?,
        ))
    }

    /// Map a whole split, failing on the first unknown name.
    pub fn resolve_all<'a>(
        &self,
        triples: impl IntoIterator<Item = &'a (String, String, String)>,
    ) -> Result<Vec<Triple>> {
        triples
            .into_iter()
            .map(|(h, r, t)| self.resolve(h, r, t))
            .collect()
    }

    /// Resolve three named splits and build a store sized to this vocabulary.
    pub fn build_store(
        &self,
        train: &[(String, String, String)],
        valid: &[(String, String, String)],
        test: &[(String, String, String)],
    ) -> Result<TripleStore> {
        TripleStore::new(
            self.entity_count(),
            self.relation_count(),
            self.resolve_all(train)?,
            self.resolve_all(valid)?,
            self.resolve_all(test)?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triple::{Split, SplitScope};

    fn named(h: &str, r: &str, t: &str) -> (String, String, String) {
        (h.to_owned(), r.to_owned(), t.to_owned())
    }

    fn corpus() -> [Vec<(String, String, String)>; 3] {
        [
            vec![
                named("Einstein", "won", "NobelPrize"),
                named("Curie", "won", "NobelPrize"),
            ],
            vec![named("Curie", "bornIn", "Poland")],
            vec![named("Einstein", "bornIn", "Germany")],
        ]
    }

    #[test]
    fn test_first_appearance_order() {
        let [train, valid, test] = corpus();
        let vocab = Vocabulary::build([&train, &valid, &test]);

        assert_eq!(vocab.entity_count(), 5);
        assert_eq!(vocab.relation_count(), 2);
        assert_eq!(vocab.entity_id("Einstein").unwrap(), 0);
        assert_eq!(vocab.entity_id("NobelPrize").unwrap(), 1);
        assert_eq!(vocab.entity_id("Germany").unwrap(), 4);
        assert_eq!(vocab.relation_id("bornIn").unwrap(), 1);
        assert_eq!(vocab.entity_name(2), Some("Curie"));
        assert_eq!(vocab.relation_name(7), None);
    }

    #[test]
    fn test_unknown_names() {
        let [train, ..] = corpus();
        let vocab = Vocabulary::build([&train]);
        assert!(matches!(
            vocab.resolve("Bohr", "won", "NobelPrize"),
            Err(Error::EntityNotFound(name)) if name == "Bohr"
        ));
        assert!(matches!(
            vocab.resolve("Curie", "bornIn", "NobelPrize"),
            Err(Error::RelationNotFound(_))
        ));
    }

    #[test]
    fn test_build_store() {
        let [train, valid, test] = corpus();
        let vocab = Vocabulary::build([&train, &valid, &test]);
        let store = vocab.build_store(&train, &valid, &test).unwrap();

        assert_eq!(store.entity_count(), 5);
        assert_eq!(store.len(Split::Train), 2);
        let q = vocab.resolve("Einstein", "bornIn", "Germany").unwrap();
        assert!(store.contains(&q, SplitScope::Test));
    }
}
