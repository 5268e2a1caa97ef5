//! The estimation variant: predicts a candidate's eval without
//! materialising its join, so the beam search can sample only the most
//! promising operators when `observationRatio >= 1`.
//!
//! The original's exact estimator (which combines per-column value-set
//! sizes, intersection counts, and variable-link path lengths) was filtered
//! out of the kept source along with `Eval` itself. [`EstRule::estimate`]
//! substitutes a relative-selectivity heuristic over the same two inputs the
//! original's signature implies: per-relation column cardinalities for
//! operators that touch a fresh predicate or constant, and
//! [`BodyVarLinkManager`]'s link-distance BFS for operators that bind or
//! join limited variables already present in the rule — see `DESIGN.md`.

use std::collections::{HashMap, HashSet};

use crate::cache::{CachedRule, Slot};
use crate::eval::Eval;
use crate::kb::simple_kb::SimpleKb;
use crate::rule::core::Predicate;

/// One candidate specialization operator, cheap to enumerate and describe
/// without applying it.
#[derive(Debug, Clone, Copy)]
pub enum CaseOp {
    /// Case 1: bind an EMPTY slot to an already-present LV.
    Case1 { slot: Slot, vid: usize },
    /// Case 2: append a new body predicate whose column `col` binds an
    /// existing LV.
    Case2 { relation_id: usize, col: usize, vid: usize },
    /// Case 3: create a fresh LV joining two EMPTY slots.
    Case3 { slot1: Slot, slot2: Slot },
    /// Case 4: append a new body predicate and join its column `col` to an
    /// existing EMPTY slot via a fresh LV.
    Case4 { relation_id: usize, col: usize, target_slot: Slot },
    /// Case 5: bind an EMPTY slot to a promising constant.
    Case5 { slot: Slot, constant: i32 },
}

/// Resolves the `(relation_id, column)` a slot refers to.
pub(crate) fn slot_relation_col(head: &Predicate, body: &[Predicate], slot: Slot) -> (usize, usize) {
    match slot {
        Slot::Head(col) => (head.symbol, col),
        Slot::Body(idx, col) => (body[idx].symbol, col),
    }
}

/// Disjoint adjacency graph over a rule's limited variables: two LVs are
/// linked if some body predicate binds both.
pub struct BodyVarLinkManager {
    adjacency: HashMap<usize, HashSet<usize>>,
}

impl BodyVarLinkManager {
    pub fn from_rule(rule: &CachedRule) -> Self {
        let mut adjacency: HashMap<usize, HashSet<usize>> = HashMap::new();
        for pred in rule.body() {
            let vars: Vec<usize> = pred.variables().collect();
            for i in 0..vars.len() {
                for j in (i + 1)..vars.len() {
                    adjacency.entry(vars[i]).or_default().insert(vars[j]);
                    adjacency.entry(vars[j]).or_default().insert(vars[i]);
                }
            }
        }
        BodyVarLinkManager { adjacency }
    }

    /// BFS distance between two LVs over the current link graph, or `None`
    /// if they're in different components.
    pub fn shortest_path(&self, a: usize, b: usize) -> Option<usize> {
        if a == b {
            return Some(0);
        }
        let mut visited = HashSet::new();
        visited.insert(a);
        let mut frontier = vec![a];
        let mut dist = 0;
        while !frontier.is_empty() {
            dist += 1;
            let mut next = Vec::new();
            for node in frontier {
                if let Some(neighbors) = self.adjacency.get(&node) {
                    for &n in neighbors {
                        if n == b {
                            return Some(dist);
                        }
                        if visited.insert(n) {
                            next.push(n);
                        }
                    }
                }
            }
            frontier = next;
        }
        None
    }

    /// Whether a case-1 operator (bind a slot to `existing`) would create a
    /// new link with `new_slot_var`: 0 if they're already connected by some
    /// path (the bind adds no information the body doesn't already
    /// enforce), 1 if they sit in disjoint components today.
    pub fn assume_spec_opr_case1(&self, existing: usize, new_slot_var: usize) -> usize {
        usize::from(self.shortest_path(existing, new_slot_var).is_none())
    }

    /// Same assumption for a case-3 fresh-LV join between two previously
    /// unrelated slots.
    pub fn assume_spec_opr_case3(&self, var_a: usize, var_b: usize) -> usize {
        usize::from(self.shortest_path(var_a, var_b).is_none())
    }

    /// Shortest path from `target` to `new_slot_var`, assuming a case-1
    /// operator has just linked `existing` to `new_slot_var`.
    pub fn assume_shortest_path_case1(&self, existing: usize, new_slot_var: usize, target: usize) -> Option<usize> {
        let direct = self.shortest_path(target, new_slot_var);
        let via_existing = self.shortest_path(target, existing).map(|d| d + 1);
        shorter(direct, via_existing)
    }

    /// Shortest path from `target` to `var_a`, assuming a case-3 operator
    /// has just linked `var_a` to `var_b`.
    pub fn assume_shortest_path_case3(&self, var_a: usize, var_b: usize, target: usize) -> Option<usize> {
        let direct = self.shortest_path(target, var_a);
        let via_b = self.shortest_path(target, var_b).map(|d| d + 1);
        shorter(direct, via_b)
    }
}

fn shorter(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (None, None) => None,
    }
}

/// Wraps a beam rule with its link graph to estimate operator evals cheaply.
pub struct EstRule<'a> {
    rule: &'a CachedRule,
    link_manager: BodyVarLinkManager,
}

impl<'a> EstRule<'a> {
    pub fn new(rule: &'a CachedRule) -> Self {
        EstRule {
            rule,
            link_manager: BodyVarLinkManager::from_rule(rule),
        }
    }

    pub fn link_manager(&self) -> &BodyVarLinkManager {
        &self.link_manager
    }

    /// Approximates the eval a materialised candidate would receive.
    pub fn estimate(&self, op: &CaseOp, kb: &SimpleKb) -> Eval {
        let base = self.rule.eval();
        let selectivity = self.selectivity(op, kb);
        let pos = base.pos() * selectivity;
        let neg = base.neg() * selectivity;
        Eval::new(pos, pos + neg, self.rule.length() + 1)
    }

    fn selectivity(&self, op: &CaseOp, kb: &SimpleKb) -> f64 {
        match *op {
            CaseOp::Case5 { slot, .. } => {
                let (relation_id, _col) = slot_relation_col(self.rule.head(), self.rule.body(), slot);
                kb.relation(relation_id).map_or(1.0, |r| {
                    let distinct = r.all_constants().len().max(1);
                    1.0 / distinct as f64
                })
            }
            CaseOp::Case1 { slot, vid } => self.link_selectivity_case1(slot, vid),
            CaseOp::Case3 { slot1, slot2 } => self.link_selectivity_case3(slot1, slot2),
            CaseOp::Case2 { relation_id, .. } | CaseOp::Case4 { relation_id, .. } => {
                kb.relation(relation_id).map_or(1.0, |r| 1.0 / (r.total_rows().max(1) as f64).sqrt())
            }
        }
    }

    fn predicate_for_slot(&self, slot: Slot) -> &Predicate {
        match slot {
            Slot::Head(_) => self.rule.head(),
            Slot::Body(idx, _) => &self.rule.body()[idx],
        }
    }

    fn all_rule_vars(&self) -> Vec<usize> {
        let mut vars: Vec<usize> = self.rule.head().variables().collect();
        for pred in self.rule.body() {
            vars.extend(pred.variables());
        }
        vars.sort_unstable();
        vars.dedup();
        vars
    }

    /// Case 1 binds `slot` to `vid`. Its predicate's other already-bound
    /// variables (`other`) each either gain a new link to `vid` or already
    /// have one; for each genuinely new link, `assume_shortest_path_case1`
    /// reports how close the rest of the rule's variables already sit to
    /// `other`, averaged into a selectivity factor — a link that reaches
    /// into a far-flung, previously unconnected part of the body prunes the
    /// candidate set harder than one that merely shortcuts an existing path.
    fn link_selectivity_case1(&self, slot: Slot, vid: usize) -> f64 {
        let pred_vars: Vec<usize> = self.predicate_for_slot(slot).variables().collect();
        if pred_vars.is_empty() {
            return 0.5;
        }
        let rest = self.all_rule_vars();
        let mut total = 0.0;
        let mut count = 0usize;
        for &other in &pred_vars {
            if self.link_manager.assume_spec_opr_case1(vid, other) == 0 {
                total += 1.0;
                count += 1;
                continue;
            }
            for &target in &rest {
                if target == other || target == vid {
                    continue;
                }
                let distance = self.link_manager.assume_shortest_path_case1(vid, other, target);
                total += distance_factor(distance);
                count += 1;
            }
        }
        (total / count.max(1) as f64).clamp(0.05, 1.0)
    }

    /// Case 3 joins two empty slots via a fresh LV. Every pair of
    /// already-bound variables across the two slots' predicates is checked
    /// with `assume_spec_opr_case3`/`assume_shortest_path_case3` the same
    /// way `link_selectivity_case1` checks case 1's single new link.
    fn link_selectivity_case3(&self, slot1: Slot, slot2: Slot) -> f64 {
        let vars1: Vec<usize> = self.predicate_for_slot(slot1).variables().collect();
        let vars2: Vec<usize> = self.predicate_for_slot(slot2).variables().collect();
        if vars1.is_empty() || vars2.is_empty() {
            return 0.3;
        }
        let rest = self.all_rule_vars();
        let mut total = 0.0;
        let mut count = 0usize;
        for &a in &vars1 {
            for &b in &vars2 {
                if self.link_manager.assume_spec_opr_case3(a, b) == 0 {
                    total += 1.0;
                    count += 1;
                    continue;
                }
                for &target in &rest {
                    if target == a || target == b {
                        continue;
                    }
                    let distance = self.link_manager.assume_shortest_path_case3(a, b, target);
                    total += distance_factor(distance);
                    count += 1;
                }
            }
        }
        (total / count.max(1) as f64).clamp(0.05, 1.0)
    }
}

/// Converts a hypothetical BFS distance into a (0, 1] selectivity factor:
/// closer reach means the new link is more redundant with what the body
/// already enforces, so it prunes less.
fn distance_factor(distance: Option<usize>) -> f64 {
    match distance {
        None => 0.2,
        Some(d) => 1.0 / (1.0 + d as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::catalog::Catalog;
    use crate::kb::record::Record;
    use crate::kb::relation::SimpleRelation;
    use crate::rule::core::Argument;

    fn pred(symbol: usize, args: Vec<Argument>) -> Predicate {
        Predicate::new(symbol, args)
    }

    #[test]
    fn adjacent_variables_have_distance_one() {
        let body = vec![pred(1, vec![Argument::Variable(0), Argument::Variable(1)])];
        let mut adjacency: HashMap<usize, HashSet<usize>> = HashMap::new();
        for p in &body {
            let vars: Vec<usize> = p.variables().collect();
            for i in 0..vars.len() {
                for j in (i + 1)..vars.len() {
                    adjacency.entry(vars[i]).or_default().insert(vars[j]);
                    adjacency.entry(vars[j]).or_default().insert(vars[i]);
                }
            }
        }
        let manager = BodyVarLinkManager { adjacency };
        assert_eq!(manager.shortest_path(0, 1), Some(1));
        assert_eq!(manager.shortest_path(0, 0), Some(0));
        assert_eq!(manager.shortest_path(0, 2), None);
    }

    fn chain_manager() -> BodyVarLinkManager {
        // 0 - 1 - 2, with 3 disconnected.
        let body = vec![
            pred(1, vec![Argument::Variable(0), Argument::Variable(1)]),
            pred(2, vec![Argument::Variable(1), Argument::Variable(2)]),
        ];
        let mut adjacency: HashMap<usize, HashSet<usize>> = HashMap::new();
        for p in &body {
            let vars: Vec<usize> = p.variables().collect();
            for i in 0..vars.len() {
                for j in (i + 1)..vars.len() {
                    adjacency.entry(vars[i]).or_default().insert(vars[j]);
                    adjacency.entry(vars[j]).or_default().insert(vars[i]);
                }
            }
        }
        adjacency.entry(3).or_default();
        BodyVarLinkManager { adjacency }
    }

    #[test]
    fn assume_spec_opr_distinguishes_new_from_redundant_links() {
        let manager = chain_manager();
        // 0 and 1 are already connected (directly); binding them is redundant.
        assert_eq!(manager.assume_spec_opr_case1(0, 1), 0);
        // a variable is trivially "connected" to itself.
        assert_eq!(manager.assume_spec_opr_case1(0, 0), 0);
        // 0 and 3 share no path at all; binding them is a genuinely new link.
        assert_eq!(manager.assume_spec_opr_case1(0, 3), 1);
        assert_eq!(manager.assume_spec_opr_case3(2, 3), 1);
        assert_eq!(manager.assume_spec_opr_case3(0, 2), 0);
    }

    #[test]
    fn assume_shortest_path_accounts_for_the_hypothetical_edge() {
        let manager = chain_manager();
        // Without the hypothetical edge, 3 is unreachable from 0.
        assert_eq!(manager.shortest_path(0, 3), None);
        // Case 1 hypothetically links 3 to 1; now 0 reaches 3 via 1 in two hops.
        assert_eq!(manager.assume_shortest_path_case1(1, 3, 0), Some(2));
        // Case 3 hypothetically links 3 to 0; now 2 reaches 3 via 1, 0 in three hops.
        assert_eq!(manager.assume_shortest_path_case3(3, 0, 2), Some(3));
    }

    #[test]
    fn estimate_scales_down_from_base_eval() {
        let mut catalog = Catalog::new();
        for i in 0..4 {
            catalog.register_constant(i, format!("c{i}"));
        }
        let id = catalog.register_relation("p");
        let rel = SimpleRelation::new(id, "p", vec![Record::new(vec![1, 2]), Record::new(vec![3, 4])]);
        let kb = SimpleKb::new("t", vec![rel], catalog);
        let mut pool = crate::cache::CbPool::new();
        let rule = CachedRule::new(id, &kb, &mut pool);
        let est = EstRule::new(&rule);
        let op = CaseOp::Case5 { slot: Slot::Head(0), constant: 1 };
        let eval = est.estimate(&op, &kb);
        assert!(eval.pos() <= rule.eval().pos());
    }
}
