//! A maximal body-variable-connected join fragment and its seven update
//! cases.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::cache::compliance::{CbPool, CompliedBlock};
use crate::kb::simple_kb::SimpleKb;
use crate::rule::core::{Argument, Predicate};

/// Where a limited variable is anchored inside a fragment: which template,
/// which column, and whether it is still a PLV (bound at only that one
/// position so far).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInfo {
    pub table_idx: usize,
    pub col_idx: usize,
    pub is_plv: bool,
}

#[derive(Debug, Clone)]
pub struct CacheFragment {
    pred_templates: Vec<Predicate>,
    entries: Vec<Vec<CompliedBlock>>,
    var_info: HashMap<usize, VarInfo>,
}

impl CacheFragment {
    /// A single-template fragment seeded with the whole (or a subset of a)
    /// relation.
    pub fn from_relation(symbol: usize, cb: CompliedBlock) -> Self {
        let arity = cb.arity();
        CacheFragment {
            pred_templates: vec![Predicate::empty(symbol, arity)],
            entries: vec![vec![cb]],
            var_info: HashMap::new(),
        }
    }

    /// An unmaterialised fragment for `symbol`/`arity`, no entries yet.
    pub fn empty(symbol: usize, arity: usize) -> Self {
        CacheFragment {
            pred_templates: vec![Predicate::empty(symbol, arity)],
            entries: Vec::new(),
            var_info: HashMap::new(),
        }
    }

    pub fn pred_templates(&self) -> &[Predicate] {
        &self.pred_templates
    }

    pub fn entries(&self) -> &[Vec<CompliedBlock>] {
        &self.entries
    }

    pub fn entry(&self, idx: usize) -> &[CompliedBlock] {
        &self.entries[idx]
    }

    pub fn var_info(&self) -> &HashMap<usize, VarInfo> {
        &self.var_info
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn total_tables(&self) -> usize {
        self.pred_templates.len()
    }

    pub fn has_lv(&self, vid: usize) -> bool {
        self.var_info.contains_key(&vid)
    }

    // -- shared join primitives -------------------------------------------

    fn split_within_table(&mut self, tidx: usize, c1: usize, c2: usize, pool: &mut CbPool, kb: &SimpleKb) {
        let relation_id = self.pred_templates[tidx].symbol;
        let relation = kb.relation(relation_id).expect("valid relation id");
        let mut new_entries = Vec::new();
        for entry in &self.entries {
            let cb = &entry[tidx];
            let groups = cb.with_index(|idx| idx.match_slices(c1, c2));
            for group in groups {
                if group.is_empty() {
                    continue;
                }
                let global = cb.to_global_rows(&group);
                let new_cb = pool.get_or_create(relation, global);
                let mut new_entry = entry.clone();
                new_entry[tidx] = new_cb;
                new_entries.push(new_entry);
            }
        }
        self.entries = new_entries;
    }

    fn split_cross_table(
        &mut self,
        tidx1: usize,
        c1: usize,
        tidx2: usize,
        c2: usize,
        pool: &mut CbPool,
        kb: &SimpleKb,
    ) {
        let rel1 = self.pred_templates[tidx1].symbol;
        let rel2 = self.pred_templates[tidx2].symbol;
        let relation1 = kb.relation(rel1).expect("valid relation id");
        let relation2 = kb.relation(rel2).expect("valid relation id");
        let mut new_entries = Vec::new();
        for entry in &self.entries {
            let cb1 = &entry[tidx1];
            let cb2 = &entry[tidx2];
            let pairs = cb1.with_index(|idx1| cb2.with_index(|idx2| idx1.match_slices_with(c1, idx2, c2)));
            for (l1, l2) in pairs {
                if l1.is_empty() || l2.is_empty() {
                    continue;
                }
                let g1 = cb1.to_global_rows(&l1);
                let g2 = cb2.to_global_rows(&l2);
                let new_cb1 = pool.get_or_create(relation1, g1);
                let new_cb2 = pool.get_or_create(relation2, g2);
                let mut new_entry = entry.clone();
                new_entry[tidx1] = new_cb1;
                new_entry[tidx2] = new_cb2;
                new_entries.push(new_entry);
            }
        }
        self.entries = new_entries;
    }

    /// Appends `other`'s templates (offset) and forms the entry-level cross
    /// product; callers narrow the product with [`Self::split_cross_table`]
    /// immediately after.
    fn append_other(&mut self, other: &CacheFragment) -> usize {
        let offset = self.pred_templates.len();
        self.pred_templates.extend(other.pred_templates.iter().cloned());
        let mut new_entries = Vec::with_capacity(self.entries.len() * other.entries.len().max(1));
        for se in &self.entries {
            for oe in &other.entries {
                let mut combined = se.clone();
                combined.extend(oe.iter().cloned());
                new_entries.push(combined);
            }
        }
        self.entries = new_entries;
        for (&vid, vi) in &other.var_info {
            self.var_info.entry(vid).or_insert(VarInfo {
                table_idx: vi.table_idx + offset,
                col_idx: vi.col_idx,
                is_plv: vi.is_plv,
            });
        }
        offset
    }

    // -- the seven canonical transitions -----------------------------------

    /// Case 1a: bind an EMPTY at `(tidx, col)` to an LV already present in
    /// this fragment.
    pub fn update_case1a(&mut self, tidx: usize, col: usize, vid: usize, pool: &mut CbPool, kb: &SimpleKb) {
        match self.var_info.get(&vid).copied() {
            None => {
                self.var_info.insert(
                    vid,
                    VarInfo {
                        table_idx: tidx,
                        col_idx: col,
                        is_plv: true,
                    },
                );
            }
            Some(mut anchor) => {
                if anchor.table_idx == tidx {
                    self.split_within_table(tidx, anchor.col_idx, col, pool, kb);
                } else {
                    self.split_cross_table(anchor.table_idx, anchor.col_idx, tidx, col, pool, kb);
                }
                anchor.is_plv = false;
                self.var_info.insert(vid, anchor);
            }
        }
        self.pred_templates[tidx].args[col] = Argument::Variable(vid);
    }

    /// Case 1b: append a new template, binding one of its args to an
    /// already non-PLV LV.
    pub fn update_case1b(
        &mut self,
        existing_vid: usize,
        new_relation_id: usize,
        new_col: usize,
        pool: &mut CbPool,
        kb: &SimpleKb,
    ) {
        let anchor = self.var_info[&existing_vid];
        let relation = kb.relation(new_relation_id).expect("valid relation id");
        let whole = pool.whole_relation(relation);
        let new_tidx = self.pred_templates.len();
        self.pred_templates
            .push(Predicate::empty(new_relation_id, relation.arity()));
        for entry in &mut self.entries {
            entry.push(Rc::clone(&whole));
        }
        self.split_cross_table(anchor.table_idx, anchor.col_idx, new_tidx, new_col, pool, kb);
        self.pred_templates[new_tidx].args[new_col] = Argument::Variable(existing_vid);
    }

    /// Case 1c: merge another fragment in, binding one of its EMPTY args to
    /// an LV already present in this fragment.
    pub fn merge_case1c(
        &mut self,
        other: &CacheFragment,
        existing_vid: usize,
        other_tidx: usize,
        other_col: usize,
        pool: &mut CbPool,
        kb: &SimpleKb,
    ) {
        let anchor = self.var_info[&existing_vid];
        let offset = self.append_other(other);
        self.split_cross_table(anchor.table_idx, anchor.col_idx, offset + other_tidx, other_col, pool, kb);
        self.pred_templates[offset + other_tidx].args[other_col] = Argument::Variable(existing_vid);
    }

    /// Case 2a: create a fresh LV from two EMPTYs inside this fragment.
    pub fn update_case2a(
        &mut self,
        tidx1: usize,
        col1: usize,
        tidx2: usize,
        col2: usize,
        vid: usize,
        pool: &mut CbPool,
        kb: &SimpleKb,
    ) {
        if tidx1 == tidx2 {
            self.split_within_table(tidx1, col1, col2, pool, kb);
        } else {
            self.split_cross_table(tidx1, col1, tidx2, col2, pool, kb);
        }
        self.pred_templates[tidx1].args[col1] = Argument::Variable(vid);
        self.pred_templates[tidx2].args[col2] = Argument::Variable(vid);
        self.var_info.insert(
            vid,
            VarInfo {
                table_idx: tidx1,
                col_idx: col1,
                is_plv: false,
            },
        );
    }

    /// Case 2b: append a new template and create a fresh LV linking it to an
    /// EMPTY in this fragment.
    pub fn update_case2b(
        &mut self,
        existing_tidx: usize,
        existing_col: usize,
        new_relation_id: usize,
        new_col: usize,
        vid: usize,
        pool: &mut CbPool,
        kb: &SimpleKb,
    ) {
        let relation = kb.relation(new_relation_id).expect("valid relation id");
        let whole = pool.whole_relation(relation);
        let new_tidx = self.pred_templates.len();
        self.pred_templates
            .push(Predicate::empty(new_relation_id, relation.arity()));
        for entry in &mut self.entries {
            entry.push(Rc::clone(&whole));
        }
        self.split_cross_table(existing_tidx, existing_col, new_tidx, new_col, pool, kb);
        self.pred_templates[existing_tidx].args[existing_col] = Argument::Variable(vid);
        self.pred_templates[new_tidx].args[new_col] = Argument::Variable(vid);
        self.var_info.insert(
            vid,
            VarInfo {
                table_idx: existing_tidx,
                col_idx: existing_col,
                is_plv: false,
            },
        );
    }

    /// Case 2c: merge two fragments via a fresh LV anchored by an EMPTY in
    /// each.
    pub fn merge_case2c(
        &mut self,
        other: &CacheFragment,
        self_tidx: usize,
        self_col: usize,
        other_tidx: usize,
        other_col: usize,
        vid: usize,
        pool: &mut CbPool,
        kb: &SimpleKb,
    ) {
        let offset = self.append_other(other);
        self.split_cross_table(self_tidx, self_col, offset + other_tidx, other_col, pool, kb);
        self.pred_templates[self_tidx].args[self_col] = Argument::Variable(vid);
        self.pred_templates[offset + other_tidx].args[other_col] = Argument::Variable(vid);
        self.var_info.insert(
            vid,
            VarInfo {
                table_idx: self_tidx,
                col_idx: self_col,
                is_plv: false,
            },
        );
    }

    /// Case 3: bind an EMPTY to a constant.
    pub fn update_case3(&mut self, tidx: usize, col: usize, constant: i32, pool: &mut CbPool, kb: &SimpleKb) {
        let relation_id = self.pred_templates[tidx].symbol;
        let relation = kb.relation(relation_id).expect("valid relation id");
        let mut new_entries = Vec::new();
        for entry in &self.entries {
            let cb = &entry[tidx];
            let local = cb.get_slice(col, constant);
            if local.is_empty() {
                continue;
            }
            let global = cb.to_global_rows(&local);
            let new_cb = pool.get_or_create(relation, global);
            let mut new_entry = entry.clone();
            new_entry[tidx] = new_cb;
            new_entries.push(new_entry);
        }
        self.entries = new_entries;
        self.pred_templates[tidx].args[col] = Argument::Constant(constant);
    }

    // -- counting / enumeration ---------------------------------------------

    pub fn count_combinations(&self, vids: &[usize]) -> usize {
        self.enumerate_combinations(vids).len()
    }

    /// Distinct tuples obtainable from this fragment's entries, ordered as
    /// `vids`: fixed values for non-PLV variables, a per-entry Cartesian
    /// product of per-table row values for PLVs.
    pub fn enumerate_combinations(&self, vids: &[usize]) -> HashSet<Vec<i32>> {
        let mut lv_positions = Vec::new();
        let mut plv_by_table: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
        for (pos, &vid) in vids.iter().enumerate() {
            let info = self.var_info[&vid];
            if info.is_plv {
                plv_by_table.entry(info.table_idx).or_default().push((info.col_idx, pos));
            } else {
                lv_positions.push((pos, info));
            }
        }
        let mut table_keys: Vec<usize> = plv_by_table.keys().copied().collect();
        table_keys.sort_unstable();

        let mut result = HashSet::new();
        for entry in &self.entries {
            let mut base = vec![0i32; vids.len()];
            for (pos, info) in &lv_positions {
                base[*pos] = entry[info.table_idx].rows()[0][info.col_idx];
            }

            let mut combos: Vec<Vec<(usize, i32)>> = vec![Vec::new()];
            for &tidx in &table_keys {
                let cols = &plv_by_table[&tidx];
                let cb = &entry[tidx];
                let mut next = Vec::new();
                for combo in &combos {
                    for row in cb.rows() {
                        let mut extended = combo.clone();
                        for &(col, pos) in cols {
                            extended.push((pos, row[col]));
                        }
                        next.push(extended);
                    }
                }
                combos = next;
            }

            for combo in combos {
                let mut tuple = base.clone();
                for (pos, value) in combo {
                    tuple[pos] = value;
                }
                result.insert(tuple);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::catalog::Catalog;
    use crate::kb::record::Record;
    use crate::kb::relation::SimpleRelation;

    fn kb_with_p() -> (SimpleKb, usize) {
        let mut catalog = Catalog::new();
        let id = catalog.register_relation("p");
        let rel = SimpleRelation::new(
            id,
            "p",
            vec![
                Record::new(vec![1, 1, 1]),
                Record::new(vec![1, 1, 2]),
                Record::new(vec![1, 2, 3]),
                Record::new(vec![2, 1, 3]),
                Record::new(vec![4, 4, 6]),
                Record::new(vec![5, 5, 1]),
                Record::new(vec![1, 3, 2]),
                Record::new(vec![2, 4, 4]),
            ],
        );
        (SimpleKb::new("test", vec![rel], catalog), id)
    }

    #[test]
    fn case1a_partitions_by_repeated_column_value() {
        let (kb, rel_id) = kb_with_p();
        let mut pool = CbPool::new();
        let whole = pool.whole_relation(kb.relation(rel_id).unwrap());
        let mut frag = CacheFragment::from_relation(rel_id, whole);

        frag.update_case1a(0, 0, 0, &mut pool, &kb);
        frag.update_case1a(0, 1, 0, &mut pool, &kb);

        let mut groups: Vec<Vec<i32>> = frag
            .entries()
            .iter()
            .map(|entry| {
                let mut rows: Vec<i32> = entry[0].rows().iter().map(|r| r[2]).collect();
                rows.sort_unstable();
                rows
            })
            .collect();
        groups.sort();
        assert_eq!(groups, vec![vec![1], vec![1, 2], vec![6]]);
    }

    #[test]
    fn case2a_then_case1a_yields_single_diagonal_entry() {
        let (kb, rel_id) = kb_with_p();
        let mut pool = CbPool::new();
        let whole = pool.whole_relation(kb.relation(rel_id).unwrap());
        let mut frag = CacheFragment::from_relation(rel_id, whole);

        frag.update_case2a(0, 0, 0, 1, 1, &mut pool, &kb);
        frag.update_case1a(0, 2, 1, &mut pool, &kb);

        assert_eq!(frag.entries().len(), 1);
        let rows = frag.entry(0)[0].rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_slice(), &[1, 1, 1]);
    }

    #[test]
    fn empty_result_clears_entries() {
        let (kb, rel_id) = kb_with_p();
        let mut pool = CbPool::new();
        let whole = pool.whole_relation(kb.relation(rel_id).unwrap());
        let mut frag = CacheFragment::from_relation(rel_id, whole);

        frag.update_case3(0, 0, 999, &mut pool, &kb);
        assert!(frag.is_empty());
    }

    #[test]
    fn count_combinations_matches_enumeration_len() {
        let (kb, rel_id) = kb_with_p();
        let mut pool = CbPool::new();
        let whole = pool.whole_relation(kb.relation(rel_id).unwrap());
        let mut frag = CacheFragment::from_relation(rel_id, whole);
        frag.update_case1a(0, 0, 0, &mut pool, &kb);

        let combos = frag.enumerate_combinations(&[0]);
        assert_eq!(frag.count_combinations(&[0]), combos.len());
    }
}
