//! Immutable sorted row-set with per-column indices.
//!
//! All "slice" returns are logical views: lists of row indices into the
//! table's own row storage, never copies of the rows themselves.

use std::collections::HashMap;
use std::rc::Rc;

use crate::kb::record::Record;

#[derive(Debug)]
pub struct IntTable {
    rows: Vec<Rc<Record>>,
    arity: usize,
    col_index: Vec<HashMap<i32, Vec<usize>>>,
}

impl IntTable {
    /// Builds the per-column indices eagerly; a table is always internally
    /// indexed once constructed (laziness is a property of whether a
    /// [`crate::cache::compliance::CompliedBlock`] bothers to build one at
    /// all, not of the table itself).
    pub fn new(rows: Vec<Rc<Record>>) -> Self {
        let arity = rows.first().map_or(0, |r| r.arity());
        let mut col_index: Vec<HashMap<i32, Vec<usize>>> = vec![HashMap::new(); arity];
        for (idx, row) in rows.iter().enumerate() {
            for (c, slot) in col_index.iter_mut().enumerate() {
                slot.entry(row[c]).or_default().push(idx);
            }
        }
        IntTable {
            rows,
            arity,
            col_index,
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn total_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Rc<Record>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> &Record {
        &self.rows[idx]
    }

    /// Row indices whose `col` equals `value`, or empty if none match.
    pub fn get_slice(&self, col: usize, value: i32) -> &[usize] {
        self.col_index[col].get(&value).map_or(&[], Vec::as_slice)
    }

    /// Partitions all row indices by their distinct value in `col`.
    pub fn split_slices(&self, col: usize) -> Vec<Vec<usize>> {
        let mut groups: Vec<(i32, Vec<usize>)> = self.col_index[col]
            .iter()
            .map(|(v, rows)| (*v, rows.clone()))
            .collect();
        groups.sort_by_key(|(v, _)| *v);
        groups.into_iter().map(|(_, rows)| rows).collect()
    }

    /// Rows where `row[col1] == row[col2]`, grouped by that shared value.
    pub fn match_slices(&self, col1: usize, col2: usize) -> Vec<Vec<usize>> {
        let mut by_value: HashMap<i32, Vec<usize>> = HashMap::new();
        for (idx, row) in self.rows.iter().enumerate() {
            if row[col1] == row[col2] {
                by_value.entry(row[col1]).or_default().push(idx);
            }
        }
        let mut groups: Vec<(i32, Vec<usize>)> = by_value.into_iter().collect();
        groups.sort_by_key(|(v, _)| *v);
        groups.into_iter().map(|(_, rows)| rows).collect()
    }

    /// Pairs of aligned row-index slices from `self` and `other`, joined on
    /// `self_col == other_col`, ordered by the shared value.
    pub fn match_slices_with(
        &self,
        self_col: usize,
        other: &IntTable,
        other_col: usize,
    ) -> Vec<(Vec<usize>, Vec<usize>)> {
        let mut values: Vec<i32> = self.col_index[self_col].keys().copied().collect();
        values.sort_unstable();
        values
            .into_iter()
            .filter_map(|v| {
                let other_rows = other.col_index[other_col].get(&v)?;
                let self_rows = &self.col_index[self_col][&v];
                Some((self_rows.clone(), other_rows.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: Vec<Vec<i32>>) -> IntTable {
        IntTable::new(rows.into_iter().map(|r| Rc::new(Record::new(r))).collect())
    }

    #[test]
    fn get_slice_matches_value() {
        let t = table(vec![vec![1, 1], vec![1, 2], vec![2, 3]]);
        let mut slice = t.get_slice(0, 1).to_vec();
        slice.sort_unstable();
        assert_eq!(slice, vec![0, 1]);
    }

    #[test]
    fn get_slice_empty_for_missing_value() {
        let t = table(vec![vec![1, 1]]);
        assert!(t.get_slice(0, 99).is_empty());
    }

    #[test]
    fn split_slices_partitions_all_rows() {
        let t = table(vec![vec![1], vec![2], vec![1], vec![3]]);
        let groups = t.split_slices(0);
        let total: usize = groups.iter().map(Vec::len).sum();
        assert_eq!(total, 4);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn match_slices_self_join() {
        let t = table(vec![vec![1, 1], vec![2, 3], vec![4, 4]]);
        let groups = t.match_slices(0, 1);
        let flat: Vec<usize> = groups.into_iter().flatten().collect();
        assert_eq!(flat, vec![0, 2]);
    }

    #[test]
    fn match_slices_with_joins_two_tables() {
        let a = table(vec![vec![1], vec![2], vec![3]]);
        let b = table(vec![vec![2], vec![3], vec![3]]);
        let pairs = a.match_slices_with(0, &b, 0);
        let total_b: usize = pairs.iter().map(|(_, r)| r.len()).sum();
        assert_eq!(total_b, 3);
    }

    #[test]
    fn build_indices_idempotent_layout() {
        let rows = vec![vec![1, 2], vec![3, 4]];
        let t1 = table(rows.clone());
        let t2 = table(rows);
        assert_eq!(t1.split_slices(0), t2.split_slices(0));
    }
}
