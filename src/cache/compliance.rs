//! Shared row-subset handles and the per-relation arena that deduplicates
//! them.
//!
//! The original aliases raw pointers into a process-wide pool; here the pool
//! owns `Rc`s and hands out clones, so a [`CompliedBlock`] is just a shared
//! handle with no manual lifetime management, matching the arena-indexed
//! redesign called for in the design notes.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::kb::int_table::IntTable;
use crate::kb::record::Record;
use crate::kb::relation::SimpleRelation;

#[derive(Debug)]
pub struct CompliedBlockData {
    relation_id: usize,
    row_indices: Vec<usize>,
    rows: Vec<Rc<Record>>,
    index: RefCell<Option<IntTable>>,
}

pub type CompliedBlock = Rc<CompliedBlockData>;

impl CompliedBlockData {
    pub fn relation_id(&self) -> usize {
        self.relation_id
    }

    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    pub fn rows(&self) -> &[Rc<Record>] {
        &self.rows
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn arity(&self) -> usize {
        self.rows.first().map_or(0, |r| r.arity())
    }

    /// Idempotent: a second call is a no-op and returns the same layout.
    pub fn build_indices(&self) {
        if self.index.borrow().is_none() {
            *self.index.borrow_mut() = Some(IntTable::new(self.rows.clone()));
        }
    }

    pub fn get_slice(&self, col: usize, value: i32) -> Vec<usize> {
        self.build_indices();
        self.index
            .borrow()
            .as_ref()
            .expect("just built")
            .get_slice(col, value)
            .to_vec()
    }

    /// Runs `f` with the (lazily built) index borrowed; used by
    /// [`crate::cache::fragment`] for cross-CB joins that need two indices
    /// live at once.
    pub fn with_index<R>(&self, f: impl FnOnce(&IntTable) -> R) -> R {
        self.build_indices();
        let borrowed = self.index.borrow();
        f(borrowed.as_ref().expect("just built"))
    }

    /// Maps row positions local to this CB back to original relation row
    /// indices.
    pub fn to_global_rows(&self, local: &[usize]) -> Vec<usize> {
        local.iter().map(|&i| self.row_indices[i]).collect()
    }
}

/// Process-wide (in practice, per-`RelationMiner`) arena of CBs, cleared
/// between target relations.
#[derive(Default)]
pub struct CbPool {
    pool: HashMap<(usize, Vec<usize>), CompliedBlock>,
}

impl CbPool {
    pub fn new() -> Self {
        CbPool::default()
    }

    /// Builds (or reuses) the CB covering every row of `relation`.
    pub fn whole_relation(&mut self, relation: &SimpleRelation) -> CompliedBlock {
        let indices: Vec<usize> = (0..relation.total_rows()).collect();
        self.get_or_create(relation, indices)
    }

    /// Builds (or reuses) the CB over the given row indices of `relation`.
    pub fn get_or_create(&mut self, relation: &SimpleRelation, mut row_indices: Vec<usize>) -> CompliedBlock {
        row_indices.sort_unstable();
        row_indices.dedup();
        let key = (relation.id(), row_indices.clone());
        if let Some(cb) = self.pool.get(&key) {
            return Rc::clone(cb);
        }
        let rows = row_indices
            .iter()
            .map(|&i| Rc::clone(relation.record(i)))
            .collect();
        let cb = Rc::new(CompliedBlockData {
            relation_id: relation.id(),
            row_indices,
            rows,
            index: RefCell::new(None),
        });
        self.pool.insert(key, Rc::clone(&cb));
        cb
    }

    pub fn clear(&mut self) {
        self.pool.clear();
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::record::Record;

    fn relation() -> SimpleRelation {
        SimpleRelation::new(
            0,
            "p",
            vec![
                Record::new(vec![1, 1]),
                Record::new(vec![1, 2]),
                Record::new(vec![2, 2]),
            ],
        )
    }

    #[test]
    fn pool_deduplicates_identical_subsets() {
        let rel = relation();
        let mut pool = CbPool::new();
        let a = pool.get_or_create(&rel, vec![0, 1]);
        let b = pool.get_or_create(&rel, vec![1, 0]);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn clear_empties_the_pool() {
        let rel = relation();
        let mut pool = CbPool::new();
        pool.get_or_create(&rel, vec![0]);
        pool.clear();
        assert!(pool.is_empty());
    }

    #[test]
    fn build_indices_is_idempotent() {
        let rel = relation();
        let mut pool = CbPool::new();
        let cb = pool.get_or_create(&rel, vec![0, 1, 2]);
        cb.build_indices();
        let first = cb.get_slice(1, 2).to_vec();
        cb.build_indices();
        let second = cb.get_slice(1, 2).to_vec();
        assert_eq!(first, second);
    }

    #[test]
    fn to_global_rows_maps_back_to_relation_indices() {
        let rel = relation();
        let mut pool = CbPool::new();
        let cb = pool.get_or_create(&rel, vec![2, 0]);
        assert_eq!(cb.row_indices(), &[0, 2]);
        assert_eq!(cb.to_global_rows(&[1]), vec![2]);
    }
}
