//! A candidate rule plus the three join caches that let specialization and
//! scoring run against row subsets instead of the full KB.
//!
//! `e_plus` joins the body with the head relation's non-entailed rows,
//! `e_t` the same against already-entailed rows, and `e_all` holds the
//! body-only fragments (more than one only transiently, while a
//! freshly-appended predicate hasn't yet been linked to the rest of the
//! body). All three are reference-counted so cloning a [`CachedRule`] for a
//! beam-search branch is cheap; a specialization call takes a private copy
//! of only the caches it actually mutates via `Rc::make_mut`.

use std::collections::HashSet;
use std::rc::Rc;

use crate::cache::compliance::CbPool;
use crate::cache::fragment::CacheFragment;
use crate::eval::Eval;
use crate::kb::record::Record;
use crate::kb::simple_kb::SimpleKb;
use crate::rule::core::{Argument, Predicate};

/// Index of the head's template inside `e_plus`/`e_t` (always the first one
/// seeded by [`CachedRule::new`]).
const HEAD_TABLE: usize = 0;

/// Where a body predicate's join template currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    /// Table `.0` of `e_plus`/`e_t` (kept in lockstep, same table layout).
    Head(usize),
    /// Table `.1` of `e_all[.0]`.
    BodyOnly(usize, usize),
}

/// An argument slot addressable for linking: the head, or a body predicate's
/// column.
#[derive(Debug, Clone, Copy)]
pub enum Slot {
    Head(usize),
    Body(usize, usize),
}

#[derive(Debug, Clone, Copy)]
enum AbsorbDest {
    Head,
    BodyOnly(usize),
}

/// One concrete instantiation of an accepted rule: a newly-entailed head
/// fact plus the body facts (by relation id) that entail it, used to build
/// the dependency graph between predicate instances.
#[derive(Debug, Clone)]
pub struct Grounding {
    pub head: Record,
    pub body: Vec<(usize, Record)>,
}

#[derive(Clone)]
pub struct CachedRule {
    head: Predicate,
    body: Vec<Predicate>,
    locations: Vec<Location>,
    next_var: usize,
    target_relation: usize,
    e_plus: Rc<CacheFragment>,
    e_t: Rc<CacheFragment>,
    e_all: Vec<Rc<CacheFragment>>,
    eval: Eval,
    length: usize,
}

impl CachedRule {
    /// The most general rule for `target_relation`: empty head, empty body.
    pub fn new(target_relation: usize, kb: &SimpleKb, pool: &mut CbPool) -> Self {
        let relation = kb.relation(target_relation).expect("valid target relation");
        let arity = relation.arity();
        let (non_ent, ent) = relation.split_by_entailment();

        let non_ent_count = non_ent.len();
        let ent_count = ent.len();
        let non_ent_cb = pool.get_or_create(relation, non_ent);
        let ent_cb = pool.get_or_create(relation, ent);

        let e_plus = Rc::new(CacheFragment::from_relation(target_relation, non_ent_cb));
        let e_t = Rc::new(CacheFragment::from_relation(target_relation, ent_cb));

        let all_ent = (kb.total_constants() as f64).powi(arity as i32);
        let eval = Eval::new(non_ent_count as f64, all_ent - ent_count as f64, 0);

        CachedRule {
            head: Predicate::empty(target_relation, arity),
            body: Vec::new(),
            locations: Vec::new(),
            next_var: 0,
            target_relation,
            e_plus,
            e_t,
            e_all: Vec::new(),
            eval,
            length: 0,
        }
    }

    pub fn head(&self) -> &Predicate {
        &self.head
    }

    pub fn body(&self) -> &[Predicate] {
        &self.body
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn eval(&self) -> Eval {
        self.eval
    }

    pub fn target_relation(&self) -> usize {
        self.target_relation
    }

    /// Allocates a fresh limited-variable id, for the operators that
    /// introduce a brand-new LV shared by exactly two argument slots.
    pub fn fresh_var(&mut self) -> usize {
        let id = self.next_var;
        self.next_var += 1;
        id
    }

    fn fragment_of(&self, vid: usize) -> Option<usize> {
        self.e_all.iter().position(|f| f.has_lv(vid))
    }

    fn set_arg(&mut self, slot: Slot, arg: Argument) {
        match slot {
            Slot::Head(col) => self.head.args[col] = arg,
            Slot::Body(idx, col) => self.body[idx].args[col] = arg,
        }
    }

    /// Folds `e_all[removed]` into `dest` (the head caches, or another
    /// `e_all` fragment whose table count before the merge was `offset`),
    /// fixing up every `locations` entry that pointed into it.
    fn absorb_fragment(&mut self, removed: usize, dest: AbsorbDest, offset: usize) {
        let adjusted_dest = match dest {
            AbsorbDest::BodyOnly(d) if d > removed => AbsorbDest::BodyOnly(d - 1),
            other => other,
        };
        for loc in self.locations.iter_mut() {
            match *loc {
                Location::BodyOnly(fi, t) if fi == removed => {
                    *loc = match adjusted_dest {
                        AbsorbDest::Head => Location::Head(offset + t),
                        AbsorbDest::BodyOnly(d) => Location::BodyOnly(d, offset + t),
                    };
                }
                Location::BodyOnly(fi, t) if fi > removed => {
                    *loc = Location::BodyOnly(fi - 1, t);
                }
                _ => {}
            }
        }
        self.e_all.remove(removed);
    }

    // -- head specialization: cases 1a/3, applied against HEAD_TABLE --

    /// Binds an unset head argument to an already-present limited variable.
    pub fn specialize_head_to_var(&mut self, col: usize, vid: usize, pool: &mut CbPool, kb: &SimpleKb) {
        Rc::make_mut(&mut self.e_plus).update_case1a(HEAD_TABLE, col, vid, pool, kb);
        Rc::make_mut(&mut self.e_t).update_case1a(HEAD_TABLE, col, vid, pool, kb);
        self.head.args[col] = Argument::Variable(vid);
    }

    /// Binds an unset head argument to a constant.
    pub fn specialize_head_to_constant(&mut self, col: usize, constant: i32, pool: &mut CbPool, kb: &SimpleKb) {
        self.bind_to_constant(Slot::Head(col), constant, pool, kb);
    }

    /// Case 3: binds an unset argument slot (head or body) to a constant.
    pub fn bind_to_constant(&mut self, slot: Slot, constant: i32, pool: &mut CbPool, kb: &SimpleKb) {
        match self.location_of(slot) {
            Location::Head(t) => {
                Rc::make_mut(&mut self.e_plus).update_case3(t, slot.col(), constant, pool, kb);
                Rc::make_mut(&mut self.e_t).update_case3(t, slot.col(), constant, pool, kb);
            }
            Location::BodyOnly(fi, t) => {
                Rc::make_mut(&mut self.e_all[fi]).update_case3(t, slot.col(), constant, pool, kb);
            }
        }
        self.set_arg(slot, Argument::Constant(constant));
    }

    // -- body growth: append a new predicate, optionally already linked --

    /// Case 1b/2b: appends `relation_id` as a new body predicate. With
    /// `link = None` it starts as its own one-table fragment in `e_all` (it
    /// must be connected before the rule satisfies the body-connectivity
    /// invariant); with `link = Some((existing_vid, new_col))` it is
    /// appended directly onto whichever fragment already anchors
    /// `existing_vid`.
    pub fn add_body_predicate(
        &mut self,
        relation_id: usize,
        arity: usize,
        link: Option<(usize, usize)>,
        pool: &mut CbPool,
        kb: &SimpleKb,
    ) {
        let body_idx = self.body.len();
        self.body.push(Predicate::empty(relation_id, arity));
        self.length += 1;

        let location = match link {
            None => {
                let relation = kb.relation(relation_id).expect("valid relation id");
                let whole = pool.whole_relation(relation);
                self.e_all.push(Rc::new(CacheFragment::from_relation(relation_id, whole)));
                Location::BodyOnly(self.e_all.len() - 1, 0)
            }
            Some((existing_vid, new_col)) => {
                let location = if self.e_plus.has_lv(existing_vid) {
                    let new_tidx = self.e_plus.total_tables();
                    Rc::make_mut(&mut self.e_plus).update_case1b(existing_vid, relation_id, new_col, pool, kb);
                    Rc::make_mut(&mut self.e_t).update_case1b(existing_vid, relation_id, new_col, pool, kb);
                    Location::Head(new_tidx)
                } else {
                    let fi = self.fragment_of(existing_vid).expect("LV must anchor somewhere");
                    let new_tidx = self.e_all[fi].total_tables();
                    Rc::make_mut(&mut self.e_all[fi]).update_case1b(existing_vid, relation_id, new_col, pool, kb);
                    Location::BodyOnly(fi, new_tidx)
                };
                self.body[body_idx].args[new_col] = Argument::Variable(existing_vid);
                location
            }
        };
        self.locations.push(location);
    }

    /// Case 2a/2c: creates a fresh LV linking two unset argument slots,
    /// merging their owning fragments if they were previously independent.
    pub fn link_fresh_var(&mut self, slot1: Slot, slot2: Slot, pool: &mut CbPool, kb: &SimpleKb) -> usize {
        let vid = self.fresh_var();
        let loc1 = self.location_of(slot1);
        let loc2 = self.location_of(slot2);

        match (loc1, loc2) {
            (Location::Head(t1), Location::Head(t2)) => {
                Rc::make_mut(&mut self.e_plus).update_case2a(t1, slot1.col(), t2, slot2.col(), vid, pool, kb);
                Rc::make_mut(&mut self.e_t).update_case2a(t1, slot1.col(), t2, slot2.col(), vid, pool, kb);
            }
            (Location::Head(t1), Location::BodyOnly(fi, t2)) => {
                let other = (*self.e_all[fi]).clone();
                let offset = self.e_plus.total_tables();
                Rc::make_mut(&mut self.e_plus).merge_case2c(&other, t1, slot1.col(), t2, slot2.col(), vid, pool, kb);
                Rc::make_mut(&mut self.e_t).merge_case2c(&other, t1, slot1.col(), t2, slot2.col(), vid, pool, kb);
                self.absorb_fragment(fi, AbsorbDest::Head, offset);
            }
            (Location::BodyOnly(fi, t1), Location::Head(t2)) => {
                let other = (*self.e_all[fi]).clone();
                let offset = self.e_plus.total_tables();
                Rc::make_mut(&mut self.e_plus).merge_case2c(&other, t2, slot2.col(), t1, slot1.col(), vid, pool, kb);
                Rc::make_mut(&mut self.e_t).merge_case2c(&other, t2, slot2.col(), t1, slot1.col(), vid, pool, kb);
                self.absorb_fragment(fi, AbsorbDest::Head, offset);
            }
            (Location::BodyOnly(fi1, t1), Location::BodyOnly(fi2, t2)) if fi1 == fi2 => {
                Rc::make_mut(&mut self.e_all[fi1]).update_case2a(t1, slot1.col(), t2, slot2.col(), vid, pool, kb);
            }
            (Location::BodyOnly(fi1, t1), Location::BodyOnly(fi2, t2)) => {
                let (keep, removed, kt, rt, kcol, rcol) = if fi1 < fi2 {
                    (fi1, fi2, t1, t2, slot1.col(), slot2.col())
                } else {
                    (fi2, fi1, t2, t1, slot2.col(), slot1.col())
                };
                let other = (*self.e_all[removed]).clone();
                let offset = self.e_all[keep].total_tables();
                Rc::make_mut(&mut self.e_all[keep]).merge_case2c(&other, kt, kcol, rt, rcol, vid, pool, kb);
                self.absorb_fragment(removed, AbsorbDest::BodyOnly(keep), offset);
            }
        }

        self.set_arg(slot1, Argument::Variable(vid));
        self.set_arg(slot2, Argument::Variable(vid));
        vid
    }

    /// Case 1a/1c: binds an unset argument slot to an LV that already
    /// appears somewhere in the rule.
    pub fn bind_existing_var(&mut self, slot: Slot, vid: usize, pool: &mut CbPool, kb: &SimpleKb) {
        let loc = self.location_of(slot);
        let col = slot.col();

        let anchor_in_head = self.e_plus.has_lv(vid);
        let anchor_fragment = self.fragment_of(vid);

        match (loc, anchor_in_head, anchor_fragment) {
            (Location::Head(t), _, _) => {
                Rc::make_mut(&mut self.e_plus).update_case1a(t, col, vid, pool, kb);
                Rc::make_mut(&mut self.e_t).update_case1a(t, col, vid, pool, kb);
            }
            (Location::BodyOnly(fi, t), true, _) => {
                // the new slot's fragment gets folded into the head caches.
                let frag = (*self.e_all[fi]).clone();
                let offset = self.e_plus.total_tables();
                Rc::make_mut(&mut self.e_plus).merge_case1c(&frag, vid, t, col, pool, kb);
                Rc::make_mut(&mut self.e_t).merge_case1c(&frag, vid, t, col, pool, kb);
                self.absorb_fragment(fi, AbsorbDest::Head, offset);
            }
            (Location::BodyOnly(fi, t), false, Some(anchor_fi)) if anchor_fi == fi => {
                Rc::make_mut(&mut self.e_all[fi]).update_case1a(t, col, vid, pool, kb);
            }
            (Location::BodyOnly(fi, t), false, Some(anchor_fi)) => {
                let frag = (*self.e_all[fi]).clone();
                let offset = self.e_all[anchor_fi].total_tables();
                Rc::make_mut(&mut self.e_all[anchor_fi]).merge_case1c(&frag, vid, t, col, pool, kb);
                self.absorb_fragment(fi, AbsorbDest::BodyOnly(anchor_fi), offset);
            }
            (Location::BodyOnly(fi, t), false, None) => {
                // vid hasn't been anchored anywhere yet: anchor it here as a PLV.
                Rc::make_mut(&mut self.e_all[fi]).update_case1a(t, col, vid, pool, kb);
            }
        }
        self.set_arg(slot, Argument::Variable(vid));
    }

    fn location_of(&self, slot: Slot) -> Location {
        match slot {
            Slot::Head(_) => Location::Head(HEAD_TABLE),
            Slot::Body(idx, _) => self.locations[idx],
        }
    }

    // -- scoring, evidence, counterexamples --------------------------------

    /// Ports the original entailment-counting logic: head args still unset
    /// (UV) multiply the space by `|constants|` each, head LVs that also
    /// constrain the body (GV) multiply it by the number of distinct
    /// bindings that fragment actually admits instead.
    pub fn calculate_eval(&mut self, kb: &SimpleKb) -> Eval {
        let mut head_uv_cnt = 0usize;
        let mut head_only_lvs: HashSet<usize> = HashSet::new();
        for arg in &self.head.args {
            match arg {
                Argument::Empty => head_uv_cnt += 1,
                Argument::Variable(v) => {
                    head_only_lvs.insert(*v);
                }
                Argument::Constant(_) => {}
            }
        }

        let mut gvs_per_fragment: Vec<Vec<usize>> = vec![Vec::new(); self.e_all.len()];
        for vid in head_only_lvs.clone() {
            for (fi, frag) in self.e_all.iter().enumerate() {
                if frag.has_lv(vid) {
                    gvs_per_fragment[fi].push(vid);
                    head_only_lvs.remove(&vid);
                    break;
                }
            }
        }

        let mut all_ent = (kb.total_constants() as f64).powi((head_uv_cnt + head_only_lvs.len()) as i32);
        for (fi, gvs) in gvs_per_fragment.iter().enumerate() {
            if !gvs.is_empty() {
                all_ent *= self.e_all[fi].count_combinations(gvs) as f64;
            }
        }

        let new_pos_ent: usize = self.e_plus.entries().iter().map(|e| e[HEAD_TABLE].total_rows()).sum();
        let already_ent: usize = self.e_t.entries().iter().map(|e| e[HEAD_TABLE].total_rows()).sum();

        self.eval = Eval::new(new_pos_ent as f64, all_ent - already_ent as f64, self.length + 1);
        self.eval
    }

    /// Fraction of the target relation's facts reachable through `e_plus`'s
    /// current head-table entries.
    pub fn record_coverage(&self, kb: &SimpleKb) -> f64 {
        let head_rows: usize = self.e_plus.entries().iter().map(|e| e[HEAD_TABLE].total_rows()).sum();
        let total = kb.relation(self.target_relation).map(|r| r.total_rows()).unwrap_or(0);
        if total == 0 {
            0.0
        } else {
            head_rows as f64 / total as f64
        }
    }

    /// Marks every head row reachable through `e_plus` as entailed; returns
    /// the relation-local indices that were newly marked (the rule's
    /// evidence set for this pass).
    pub fn mark_entailment(&self, kb: &mut SimpleKb) -> Vec<usize> {
        let head_rows: Vec<usize> = self
            .e_plus
            .entries()
            .iter()
            .flat_map(|e| e[HEAD_TABLE].row_indices().to_vec())
            .collect();
        let relation = kb.relation_mut(self.target_relation).expect("valid target relation");
        head_rows.into_iter().filter(|&idx| relation.entail_if_not(idx)).collect()
    }

    /// Every newly-entailed head row, paired with one representative row per
    /// body predicate reachable from the head caches. Body predicates left
    /// in an `e_all` fragment never merged into the head (a rule whose body
    /// is internally connected but not anchored to any head argument) are
    /// omitted — they contribute nothing to `e_plus` and the beam search
    /// never keeps such dead weight in an accepted rule.
    pub fn groundings(&self, kb: &SimpleKb) -> Vec<Grounding> {
        let head_relation = kb.relation(self.target_relation).expect("valid target relation");
        let mut out = Vec::new();
        for entry in self.e_plus.entries() {
            let body_rows: Vec<(usize, Record)> = self
                .locations
                .iter()
                .enumerate()
                .filter_map(|(body_idx, loc)| match loc {
                    Location::Head(t) => {
                        let relation_id = self.body[body_idx].symbol;
                        let relation = kb.relation(relation_id).ok()?;
                        let row_idx = *entry[*t].row_indices().first()?;
                        Some((relation_id, (**relation.record(row_idx)).clone()))
                    }
                    Location::BodyOnly(_, _) => None,
                })
                .collect();
            for &row_idx in entry[HEAD_TABLE].row_indices() {
                out.push(Grounding {
                    head: (**head_relation.record(row_idx)).clone(),
                    body: body_rows.clone(),
                });
            }
        }
        out
    }

    /// Every tuple the rule's current extension predicts that is not
    /// actually a fact of the target relation: values for head LVs that are
    /// also GVs come from whichever body fragment binds them, UV positions
    /// are expanded over every constant the KB contains.
    pub fn counterexamples(&self, kb: &SimpleKb) -> Vec<Record> {
        let arity = self.head.arity();
        let mut gv_positions = Vec::new();
        let mut uv_positions = Vec::new();
        let mut base = vec![0i32; arity];
        for (pos, arg) in self.head.args.iter().enumerate() {
            match arg {
                Argument::Variable(v) => gv_positions.push((pos, *v)),
                Argument::Empty => uv_positions.push(pos),
                Argument::Constant(c) => base[pos] = *c,
            }
        }

        let mut base_tuples = vec![base];
        let gv_vids: Vec<usize> = gv_positions.iter().map(|&(_, v)| v).collect();
        if !gv_vids.is_empty() {
            if let Some(frag) = self.e_all.iter().find(|f| f.has_lv(gv_vids[0])) {
                let combos = frag.enumerate_combinations(&gv_vids);
                let mut expanded = Vec::with_capacity(base_tuples.len() * combos.len().max(1));
                for b in &base_tuples {
                    for tuple in &combos {
                        let mut t = b.clone();
                        for (i, &(pos, _)) in gv_positions.iter().enumerate() {
                            t[pos] = tuple[i];
                        }
                        expanded.push(t);
                    }
                }
                base_tuples = expanded;
            }
        }

        let constants = kb.all_constants();
        let mut results = Vec::new();
        expand_uv_positions(&base_tuples, &uv_positions, &constants, &mut results);

        let relation = kb.relation(self.target_relation).expect("valid target relation");
        results
            .into_iter()
            .map(Record::new)
            .filter(|r| !relation.contains(r))
            .collect()
    }
}

impl Slot {
    fn col(self) -> usize {
        match self {
            Slot::Head(c) => c,
            Slot::Body(_, c) => c,
        }
    }
}

fn expand_uv_positions(bases: &[Vec<i32>], uv_positions: &[usize], constants: &[i32], out: &mut Vec<Vec<i32>>) {
    if uv_positions.is_empty() {
        out.extend(bases.iter().cloned());
        return;
    }
    let mut frontier = bases.to_vec();
    for &pos in uv_positions {
        let mut next = Vec::with_capacity(frontier.len() * constants.len().max(1));
        for base in &frontier {
            for &c in constants {
                let mut t = base.clone();
                t[pos] = c;
                next.push(t);
            }
        }
        frontier = next;
    }
    out.extend(frontier);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::catalog::Catalog;
    use crate::kb::relation::SimpleRelation;

    fn kb_family() -> (SimpleKb, usize) {
        let mut catalog = Catalog::new();
        for i in 0..6 {
            catalog.register_constant(i, format!("c{i}"));
        }
        let id = catalog.register_relation("family");
        let rel = SimpleRelation::new(
            id,
            "family",
            vec![Record::new(vec![1, 2, 3]), Record::new(vec![4, 5, 6])],
        );
        (SimpleKb::new("test", vec![rel], catalog), id)
    }

    #[test]
    fn fresh_cached_rule_covers_everything_with_empty_head() {
        let (kb, rel_id) = kb_family();
        let mut pool = CbPool::new();
        let rule = CachedRule::new(rel_id, &kb, &mut pool);
        assert_eq!(rule.eval().pos(), 2.0);
        assert_eq!(rule.length(), 0);
    }

    #[test]
    fn binding_head_to_constant_filters_e_plus() {
        let (kb, rel_id) = kb_family();
        let mut pool = CbPool::new();
        let mut rule = CachedRule::new(rel_id, &kb, &mut pool);
        rule.specialize_head_to_constant(0, 1, &mut pool, &kb);
        let eval = rule.calculate_eval(&kb);
        assert_eq!(eval.pos(), 1.0);
    }

    #[test]
    fn mark_entailment_sets_bits_for_e_plus_rows() {
        let (kb, rel_id) = kb_family();
        let mut pool = CbPool::new();
        let mut kb = kb;
        let rule = CachedRule::new(rel_id, &kb, &mut pool);
        let newly = rule.mark_entailment(&mut kb);
        assert_eq!(newly.len(), 2);
        assert!(kb.relation(rel_id).unwrap().is_entailed(0));
    }

    #[test]
    fn counterexamples_empty_when_every_tuple_is_a_fact() {
        let (kb, rel_id) = kb_family();
        let mut pool = CbPool::new();
        let mut rule = CachedRule::new(rel_id, &kb, &mut pool);
        rule.specialize_head_to_constant(0, 1, &mut pool, &kb);
        rule.specialize_head_to_constant(1, 2, &mut pool, &kb);
        rule.specialize_head_to_constant(2, 3, &mut pool, &kb);
        assert!(rule.counterexamples(&kb).is_empty());
    }
}
