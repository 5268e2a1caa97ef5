//! The in-memory knowledge base and its compressed counterpart.

use std::collections::HashMap;
use std::rc::Rc;

use crate::errors::KbIoError;
use crate::kb::catalog::Catalog;
use crate::kb::record::Record;
use crate::kb::relation::SimpleRelation;

/// A loaded relational KB: typed relations plus the constant/relation
/// catalog they're numbered against.
pub struct SimpleKb {
    name: String,
    relations: Vec<SimpleRelation>,
    catalog: Catalog,
}

impl SimpleKb {
    pub fn new(name: impl Into<String>, relations: Vec<SimpleRelation>, catalog: Catalog) -> Self {
        SimpleKb {
            name: name.into(),
            relations,
            catalog,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn total_relations(&self) -> usize {
        self.relations.len()
    }

    pub fn total_records(&self) -> usize {
        self.relations.iter().map(SimpleRelation::total_rows).sum()
    }

    pub fn total_constants(&self) -> usize {
        self.catalog.total_constants()
    }

    pub fn relation(&self, id: usize) -> Result<&SimpleRelation, KbIoError> {
        self.relations
            .get(id)
            .ok_or_else(|| KbIoError::UnknownRelation(id.to_string()))
    }

    pub fn relation_mut(&mut self, id: usize) -> Result<&mut SimpleRelation, KbIoError> {
        self.relations
            .get_mut(id)
            .ok_or_else(|| KbIoError::UnknownRelation(id.to_string()))
    }

    pub fn relation_by_name(&self, name: &str) -> Result<&SimpleRelation, KbIoError> {
        let id = self
            .catalog
            .relation_id(name)
            .ok_or_else(|| KbIoError::UnknownRelation(name.to_string()))?;
        self.relation(id)
    }

    pub fn relations(&self) -> &[SimpleRelation] {
        &self.relations
    }

    pub fn has_record(&self, relation_id: usize, record: &Record) -> bool {
        self.relations
            .get(relation_id)
            .is_some_and(|rel| rel.contains(record))
    }

    /// Every distinct constant appearing anywhere in the KB, scanned directly
    /// off the relations rather than the catalog (which only knows the
    /// constants a loader bothered to name).
    pub fn all_constants(&self) -> Vec<i32> {
        let mut set: Vec<i32> = self
            .relations
            .iter()
            .flat_map(SimpleRelation::all_constants)
            .collect();
        set.sort_unstable();
        set.dedup();
        set
    }

    /// Target relation ids to mine, honoring `-r n` (0 = all, else the first
    /// `n` relations in catalog order).
    pub fn target_relations(&self, max_relations: usize) -> Vec<usize> {
        let total = self.relations.len();
        let limit = if max_relations == 0 {
            total
        } else {
            max_relations.min(total)
        };
        (0..limit).collect()
    }
}

/// The output of a mining run: the rules plus whatever residual facts must
/// be kept so the original KB can be recovered by saturation.
pub struct SimpleCompressedKb {
    name: String,
    hypothesis: Vec<String>,
    fvs_records: HashMap<usize, Vec<Rc<Record>>>,
    counterexamples: HashMap<usize, Vec<Rc<Record>>>,
    supplementary_constants: Vec<i32>,
}

impl SimpleCompressedKb {
    pub fn new(name: impl Into<String>) -> Self {
        SimpleCompressedKb {
            name: name.into(),
            hypothesis: Vec::new(),
            fvs_records: HashMap::new(),
            counterexamples: HashMap::new(),
            supplementary_constants: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_hypothesis_rule(&mut self, rule_text: impl Into<String>) {
        self.hypothesis.push(rule_text.into());
    }

    pub fn add_fvs_record(&mut self, relation_id: usize, record: Rc<Record>) {
        self.fvs_records.entry(relation_id).or_default().push(record);
    }

    pub fn add_counterexamples(&mut self, relation_id: usize, records: Vec<Rc<Record>>) {
        self.counterexamples
            .entry(relation_id)
            .or_default()
            .extend(records);
    }

    pub fn update_supplementary_constants(&mut self, constants: Vec<i32>) {
        self.supplementary_constants = constants;
    }

    pub fn hypothesis(&self) -> &[String] {
        &self.hypothesis
    }

    pub fn fvs_records(&self, relation_id: usize) -> &[Rc<Record>] {
        self.fvs_records
            .get(&relation_id)
            .map_or(&[], Vec::as_slice)
    }

    pub fn counterexample_set(&self, relation_id: usize) -> &[Rc<Record>] {
        self.counterexamples
            .get(&relation_id)
            .map_or(&[], Vec::as_slice)
    }

    pub fn supplementary_constants(&self) -> &[i32] {
        &self.supplementary_constants
    }

    pub fn total_necessary_records(&self) -> usize {
        self.fvs_records.values().map(Vec::len).sum()
    }

    pub fn total_counterexamples(&self) -> usize {
        self.counterexamples.values().map(Vec::len).sum()
    }

    pub fn total_hypothesis_size(&self) -> usize {
        self.hypothesis.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::catalog::Catalog;

    fn kb() -> SimpleKb {
        let mut catalog = Catalog::new();
        catalog.register_relation("family");
        let rel = SimpleRelation::new(0, "family", vec![Record::new(vec![4, 5, 6])]);
        SimpleKb::new("test", vec![rel], catalog)
    }

    #[test]
    fn target_relations_honors_limit() {
        let kb = kb();
        assert_eq!(kb.target_relations(0), vec![0]);
        assert_eq!(kb.target_relations(1), vec![0]);
    }

    #[test]
    fn has_record_checks_the_right_relation() {
        let kb = kb();
        assert!(kb.has_record(0, &Record::new(vec![4, 5, 6])));
        assert!(!kb.has_record(0, &Record::new(vec![1, 2, 3])));
    }

    #[test]
    fn compressed_kb_accumulates_across_relations() {
        let mut compressed = SimpleCompressedKb::new("test_comp");
        compressed.add_hypothesis_rule("mother(X0,X1):-family(X0,?,X1)");
        compressed.add_fvs_record(0, Rc::new(Record::new(vec![1, 2, 3])));
        compressed.add_counterexamples(0, vec![Rc::new(Record::new(vec![1, 2, 3]))]);
        compressed.update_supplementary_constants(vec![4, 5, 6]);

        assert_eq!(compressed.total_hypothesis_size(), 1);
        assert_eq!(compressed.total_necessary_records(), 1);
        assert_eq!(compressed.total_counterexamples(), 1);
        assert_eq!(compressed.supplementary_constants(), &[4, 5, 6]);
    }
}
