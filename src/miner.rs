//! The beam-search driver: per-relation rule discovery over the
//! specialization algebra, with the estimation variant spliced in when
//! configured.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::cache::{CachedRule, CbPool, Slot};
use crate::estimate::{slot_relation_col, CaseOp, EstRule};
use crate::eval::{Eval, EvalMetric};
use crate::kb::simple_kb::SimpleKb;
use crate::rule::core::{
    category_multiset, generalize, has_duplicate_predicate, is_body_connected, Argument,
    FingerprintCache, Predicate, TabuMap, UpdateStatus,
};

/// The subset of CLI-configurable knobs the beam search consults.
#[derive(Debug, Clone, Copy)]
pub struct MinerConfig {
    pub beam_width: usize,
    pub metric: EvalMetric,
    pub min_fact_coverage: f64,
    pub min_constant_coverage: f64,
    pub stop_compression_ratio: f64,
    pub observation_ratio: f64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            beam_width: 5,
            metric: EvalMetric::CompressionRatio,
            min_fact_coverage: 0.05,
            min_constant_coverage: 0.25,
            stop_compression_ratio: 1.0,
            observation_ratio: 0.0,
        }
    }
}

/// Per-relation rule discovery: runs [`RelationMiner::find_rule`] in a loop
/// from the driver until it returns `None` or the interrupt flag fires,
/// marking each accepted rule's entailed facts before the next search.
pub struct RelationMiner<'a> {
    config: &'a MinerConfig,
    interrupt: &'a AtomicBool,
}

impl<'a> RelationMiner<'a> {
    pub fn new(config: &'a MinerConfig, interrupt: &'a AtomicBool) -> Self {
        RelationMiner { config, interrupt }
    }

    /// One beam search from the most general rule for `target_relation`.
    /// `None` means no rule cleared `min_fact_coverage`/tabu at all (the
    /// trivial rule itself was the only, useless, beam member).
    pub fn find_rule(&self, target_relation: usize, kb: &SimpleKb, pool: &mut CbPool) -> Option<CachedRule> {
        let mut fingerprints = FingerprintCache::new();
        let mut tabu = TabuMap::new();

        let mut root = CachedRule::new(target_relation, kb, pool);
        root.calculate_eval(kb);
        let mut beam = vec![root];

        loop {
            if self.interrupt.load(Ordering::Relaxed) {
                return best_of(&beam, self.config.metric).cloned();
            }

            let mut candidates = Vec::new();
            for rule in &beam {
                let ops = enumerate_operators(rule, kb, self.config.min_constant_coverage);
                let selected = self.select_operators(rule, &ops, kb);
                for op in selected {
                    if let Ok(candidate) = apply_and_check(rule, &op, kb, pool, self.config, &mut fingerprints, &mut tabu) {
                        candidates.push(candidate);
                    } else {
                        debug!(?target_relation, "candidate pruned");
                    }
                }
            }

            if candidates.is_empty() {
                return best_of(&beam, self.config.metric).cloned();
            }

            candidates.sort_by(|a, b| b.eval().compare(&a.eval(), self.config.metric));
            let best_candidate = &candidates[0];
            let best_beam = best_of(&beam, self.config.metric);

            let candidate_wins = best_beam.is_none_or(|b| {
                best_candidate.eval().compare(&b.eval(), self.config.metric) == std::cmp::Ordering::Greater
            });
            if !candidate_wins {
                return best_beam.cloned();
            }

            if best_candidate.eval().compression_ratio() >= self.config.stop_compression_ratio
                || best_candidate.eval().neg() == 0.0
            {
                return Some(best_candidate.clone());
            }

            candidates.truncate(self.config.beam_width);
            beam = candidates;
        }
    }

    /// Narrows `ops` to the top `round(beam_width * observation_ratio)` by
    /// estimated eval when estimation mode is on; otherwise returns every
    /// operator (full materialization).
    fn select_operators(&self, rule: &CachedRule, ops: &[CaseOp], kb: &SimpleKb) -> Vec<CaseOp> {
        if self.config.observation_ratio < 1.0 {
            return ops.to_vec();
        }
        let est = EstRule::new(rule);
        let mut scored: Vec<(Eval, CaseOp)> = ops.iter().map(|op| (est.estimate(op, kb), *op)).collect();
        scored.sort_by(|a, b| b.0.compare(&a.0, self.config.metric));
        let k = ((self.config.beam_width as f64) * self.config.observation_ratio).round() as usize;
        scored.into_iter().take(k.max(1)).map(|(_, op)| op).collect()
    }
}

fn best_of(beam: &[CachedRule], metric: EvalMetric) -> Option<&CachedRule> {
    beam.iter().max_by(|a, b| a.eval().compare(&b.eval(), metric))
}

/// Case 1–5 operators available from `rule`'s current structure, per the
/// deterministic enumeration order (predicate index, then argument index,
/// then LV id, then constant numeration, all ascending).
pub fn enumerate_operators(rule: &CachedRule, kb: &SimpleKb, min_constant_coverage: f64) -> Vec<CaseOp> {
    let mut ops = Vec::new();
    let empties = empty_slots(rule);
    let vars = existing_vars(rule);

    for &slot in &empties {
        for &vid in &vars {
            ops.push(CaseOp::Case1 { slot, vid });
        }
    }

    for relation in kb.relations() {
        for col in 0..relation.arity() {
            for &vid in &vars {
                ops.push(CaseOp::Case2 { relation_id: relation.id(), col, vid });
            }
        }
    }

    for i in 0..empties.len() {
        for j in (i + 1)..empties.len() {
            ops.push(CaseOp::Case3 { slot1: empties[i], slot2: empties[j] });
        }
    }

    for relation in kb.relations() {
        for col in 0..relation.arity() {
            for &slot in &empties {
                ops.push(CaseOp::Case4 { relation_id: relation.id(), col, target_slot: slot });
            }
        }
    }

    for &slot in &empties {
        let (relation_id, col) = slot_relation_col(rule.head(), rule.body(), slot);
        if let Ok(relation) = kb.relation(relation_id) {
            for constant in relation.promising_constants(col, min_constant_coverage) {
                ops.push(CaseOp::Case5 { slot, constant });
            }
        }
    }

    ops
}

fn empty_slots(rule: &CachedRule) -> Vec<Slot> {
    let mut out = Vec::new();
    for (col, arg) in rule.head().args.iter().enumerate() {
        if matches!(arg, Argument::Empty) {
            out.push(Slot::Head(col));
        }
    }
    for (idx, pred) in rule.body().iter().enumerate() {
        for (col, arg) in pred.args.iter().enumerate() {
            if matches!(arg, Argument::Empty) {
                out.push(Slot::Body(idx, col));
            }
        }
    }
    out
}

fn existing_vars(rule: &CachedRule) -> Vec<usize> {
    let mut set: HashSet<usize> = rule.head().variables().collect();
    for pred in rule.body() {
        set.extend(pred.variables());
    }
    let mut vars: Vec<usize> = set.into_iter().collect();
    vars.sort_unstable();
    vars
}

/// Applies one operator to a private clone of `rule` and runs the
/// duplicate/disconnection/coverage/tabu checks; `Err` carries the
/// [`UpdateStatus`] the candidate was discarded under.
fn apply_and_check(
    rule: &CachedRule,
    op: &CaseOp,
    kb: &SimpleKb,
    pool: &mut CbPool,
    config: &MinerConfig,
    fingerprints: &mut FingerprintCache,
    tabu: &mut TabuMap,
) -> Result<CachedRule, UpdateStatus> {
    let mut candidate = rule.clone();
    apply_operator(&mut candidate, op, pool, kb);

    if has_duplicate_predicate(candidate.body()) {
        return Err(UpdateStatus::Invalid);
    }
    if !is_body_connected(candidate.body()) {
        return Err(UpdateStatus::Invalid);
    }

    let fingerprint = crate::rule::core::Fingerprint::compute(candidate.head(), candidate.body());
    if fingerprints.contains(&fingerprint) {
        return Err(UpdateStatus::Duplicated);
    }

    let category = category_multiset(candidate.body());
    if tabu.hits(&category) {
        return Err(UpdateStatus::TabuPruned);
    }

    if candidate.record_coverage(kb) < config.min_fact_coverage {
        tabu.add(&category);
        return Err(UpdateStatus::InsufficientCoverage);
    }

    candidate.calculate_eval(kb);
    if candidate.eval().pos() == 0.0 {
        return Err(UpdateStatus::InsufficientCoverage);
    }

    fingerprints.insert(fingerprint);
    Ok(candidate)
}

/// Enumerates every valid generalization (undo-a-binding) of `head`/`body`:
/// one candidate per currently-bound argument slot whose removal survives
/// [`generalize`]'s disconnection checks. The mirror image of
/// `enumerate_operators`'s case 1–5 specialization enumeration, but `find_rule`
/// never calls this — the default beam search only ever specializes, the same
/// way the original drives generalization purely from its own test suite.
pub fn find_generalizations(head: &Predicate, body: &[Predicate]) -> Vec<(Predicate, Vec<Predicate>)> {
    let mut out = Vec::new();
    for (col, arg) in head.args.iter().enumerate() {
        if !arg.is_empty() {
            let (status, new_head, new_body) = generalize(head, body, 0, col);
            if status == UpdateStatus::Normal {
                out.push((new_head, new_body));
            }
        }
    }
    for (idx, pred) in body.iter().enumerate() {
        for (col, arg) in pred.args.iter().enumerate() {
            if !arg.is_empty() {
                let (status, new_head, new_body) = generalize(head, body, idx + 1, col);
                if status == UpdateStatus::Normal {
                    out.push((new_head, new_body));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod generalization_tests {
    use super::*;
    use crate::rule::core::Argument;

    fn pred(symbol: usize, args: Vec<Argument>) -> Predicate {
        Predicate::new(symbol, args)
    }

    #[test]
    fn find_generalizations_enumerates_every_bound_slot_but_skips_disconnecting_ones() {
        let head = pred(0, vec![Argument::Variable(0), Argument::Variable(1)]);
        let body = vec![
            pred(1, vec![Argument::Variable(0)]),
            pred(2, vec![Argument::Variable(1), Argument::Variable(0)]),
        ];
        let candidates = find_generalizations(&head, &body);
        // 5 bound slots total (head x2, q x1, r x2); undoing r's link to q
        // would leave q and r sharing no variable, so only 4 survive.
        assert_eq!(candidates.len(), 4);
        assert!(candidates
            .iter()
            .any(|(h, b)| *h == pred(0, vec![Argument::Empty, Argument::Variable(1)]) && *b == body));
    }

    #[test]
    fn find_generalizations_of_the_trivial_rule_is_empty() {
        let head = pred(0, vec![Argument::Empty, Argument::Empty]);
        assert!(find_generalizations(&head, &[]).is_empty());
    }
}

fn apply_operator(candidate: &mut CachedRule, op: &CaseOp, pool: &mut CbPool, kb: &SimpleKb) {
    match *op {
        CaseOp::Case1 { slot, vid } => candidate.bind_existing_var(slot, vid, pool, kb),
        CaseOp::Case2 { relation_id, col, vid } => {
            let arity = kb.relation(relation_id).expect("valid relation id").arity();
            candidate.add_body_predicate(relation_id, arity, Some((vid, col)), pool, kb);
        }
        CaseOp::Case3 { slot1, slot2 } => {
            candidate.link_fresh_var(slot1, slot2, pool, kb);
        }
        CaseOp::Case4 { relation_id, col, target_slot } => {
            let arity = kb.relation(relation_id).expect("valid relation id").arity();
            let new_body_idx = candidate.body().len();
            candidate.add_body_predicate(relation_id, arity, None, pool, kb);
            candidate.link_fresh_var(Slot::Body(new_body_idx, col), target_slot, pool, kb);
        }
        CaseOp::Case5 { slot, constant } => candidate.bind_to_constant(slot, constant, pool, kb),
    }
}
