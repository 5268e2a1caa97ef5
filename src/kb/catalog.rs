//! Relation name/id registry and constant numeration maps.

use std::collections::HashMap;

use crate::errors::KbIoError;

/// Maps relation symbols to their (1-based, per `Relations.tsv` line number)
/// ids, and constant numerations to their string names (the `mapN.tsv`
/// files).
#[derive(Debug, Default)]
pub struct Catalog {
    relation_names: Vec<String>,
    relation_ids: HashMap<String, usize>,
    constant_names: HashMap<i32, String>,
    constant_ids: HashMap<String, i32>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Registers a relation, assigning it the next sequential id.
    pub fn register_relation(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        if let Some(&id) = self.relation_ids.get(&name) {
            return id;
        }
        let id = self.relation_names.len();
        self.relation_ids.insert(name.clone(), id);
        self.relation_names.push(name);
        id
    }

    pub fn relation_id(&self, name: &str) -> Option<usize> {
        self.relation_ids.get(name).copied()
    }

    pub fn relation_name(&self, id: usize) -> Result<&str, KbIoError> {
        self.relation_names
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| KbIoError::UnknownRelation(id.to_string()))
    }

    pub fn total_relations(&self) -> usize {
        self.relation_names.len()
    }

    pub fn relation_names(&self) -> &[String] {
        &self.relation_names
    }

    /// Registers a constant numeration's string name. Numerations are
    /// assigned by the caller (they are derived from the `mapN.tsv` file
    /// layout: `(N-1) * 1_000_000 + line`), not by the catalog.
    pub fn register_constant(&mut self, numeration: i32, name: impl Into<String>) {
        let name = name.into();
        self.constant_ids.insert(name.clone(), numeration);
        self.constant_names.insert(numeration, name);
    }

    pub fn constant_name(&self, numeration: i32) -> Option<&str> {
        self.constant_names.get(&numeration).map(String::as_str)
    }

    pub fn constant_id(&self, name: &str) -> Option<i32> {
        self.constant_ids.get(name).copied()
    }

    pub fn total_constants(&self) -> usize {
        self.constant_names.len()
    }

    /// Every registered `(numeration, name)` pair, sorted by numeration —
    /// the order the `mapN.tsv` files are written back out in.
    pub fn constants(&self) -> Vec<(i32, &str)> {
        let mut entries: Vec<(i32, &str)> = self
            .constant_names
            .iter()
            .map(|(&numeration, name)| (numeration, name.as_str()))
            .collect();
        entries.sort_unstable_by_key(|&(numeration, _)| numeration);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_same_relation_twice_returns_same_id() {
        let mut cat = Catalog::new();
        let a = cat.register_relation("family");
        let b = cat.register_relation("family");
        assert_eq!(a, b);
        assert_eq!(cat.total_relations(), 1);
    }

    #[test]
    fn unknown_relation_id_is_an_error() {
        let cat = Catalog::new();
        assert!(cat.relation_name(0).is_err());
    }

    #[test]
    fn constant_round_trips_by_numeration_and_name() {
        let mut cat = Catalog::new();
        cat.register_constant(4, "alice");
        assert_eq!(cat.constant_name(4), Some("alice"));
        assert_eq!(cat.constant_id("alice"), Some(4));
        assert_eq!(cat.total_constants(), 1);
    }
}
