//! Predicates, arguments, fingerprints, and the structural invariants every
//! rule transition must satisfy.

use std::collections::{HashMap, HashSet};

/// One argument slot: unbound, bound to a limited variable, or bound to a
/// constant numeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Argument {
    Empty,
    Variable(usize),
    Constant(i32),
}

impl Argument {
    pub fn is_empty(self) -> bool {
        matches!(self, Argument::Empty)
    }

    pub fn as_variable(self) -> Option<usize> {
        match self {
            Argument::Variable(v) => Some(v),
            _ => None,
        }
    }
}

/// `(symbol, args)`: a relation instance with partially assigned arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Predicate {
    pub symbol: usize,
    pub args: Vec<Argument>,
}

impl Predicate {
    pub fn new(symbol: usize, args: Vec<Argument>) -> Self {
        Predicate { symbol, args }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn empty(symbol: usize, arity: usize) -> Self {
        Predicate::new(symbol, vec![Argument::Empty; arity])
    }

    pub fn variables(&self) -> impl Iterator<Item = usize> + '_ {
        self.args.iter().filter_map(|a| a.as_variable())
    }
}

/// A canonical, hashable summary of a rule's structure, invariant under
/// consistent renumbering of limited variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    head: Predicate,
    body: Vec<Predicate>,
}

impl Fingerprint {
    /// Renumbers limited variables by first occurrence (head, then body
    /// left-to-right) and sorts the body predicates into a canonical order,
    /// so any two rules identical up to LV renaming and body reordering hash
    /// equal.
    pub fn compute(head: &Predicate, body: &[Predicate]) -> Fingerprint {
        let mut remap: HashMap<usize, usize> = HashMap::new();
        let mut next = 0usize;

        let mut canon = |pred: &Predicate| -> Predicate {
            let args = pred
                .args
                .iter()
                .map(|a| match a {
                    Argument::Variable(v) => {
                        let id = *remap.entry(*v).or_insert_with(|| {
                            let id = next;
                            next += 1;
                            id
                        });
                        Argument::Variable(id)
                    }
                    other => *other,
                })
                .collect();
            Predicate::new(pred.symbol, args)
        };

        let canon_head = canon(head);
        let mut canon_body: Vec<Predicate> = body.iter().map(&mut canon).collect();
        canon_body.sort();

        Fingerprint {
            head: canon_head,
            body: canon_body,
        }
    }
}

/// The body's relation-symbol multiset, ignoring variable/constant bindings
/// entirely ("LV-free"). Used as the tabu pruning key.
pub type Category = Vec<usize>;

pub fn category_multiset(body: &[Predicate]) -> Category {
    let mut symbols: Vec<usize> = body.iter().map(|p| p.symbol).collect();
    symbols.sort_unstable();
    symbols
}

/// All sub-multisets of `category`, sizes `1..=category.len()` inclusive
/// (the full multiset included), deduplicated.
fn sub_multisets(category: &Category) -> Vec<Category> {
    let n = category.len();
    let mut result = HashSet::new();
    for mask in 1u32..(1u32 << n) {
        let mut sub: Category = (0..n)
            .filter(|i| mask & (1 << i) != 0)
            .map(|i| category[i])
            .collect();
        sub.sort_unstable();
        result.insert(sub);
    }
    result.into_iter().collect()
}

/// Fingerprint set for duplicate-structure rejection, fresh per target
/// relation mining session.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    seen: HashSet<Fingerprint>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        FingerprintCache::default()
    }

    pub fn insert(&mut self, fingerprint: Fingerprint) -> bool {
        self.seen.insert(fingerprint)
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }
}

/// Set of category multisets known to yield insufficient coverage, fresh per
/// target relation mining session.
#[derive(Debug, Default)]
pub struct TabuMap {
    pruned: HashSet<Category>,
}

impl TabuMap {
    pub fn new() -> Self {
        TabuMap::default()
    }

    pub fn add(&mut self, category: &Category) {
        self.pruned.insert(category.clone());
    }

    /// `true` if any sub-multiset of `category` (including itself) is tabu.
    pub fn hits(&self, category: &Category) -> bool {
        sub_multisets(category)
            .iter()
            .any(|sub| self.pruned.contains(sub))
    }
}

/// Outcome of applying a specialization/generalization operator to a
/// candidate rule. Only `Normal` means the candidate survives; every other
/// variant is resolved locally at the candidate boundary and never bubbles
/// up as a `Result::Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Normal,
    Duplicated,
    InsufficientCoverage,
    TabuPruned,
    Invalid,
    OutOfMemory,
}

/// `true` if every body predicate shares a limited variable, directly or
/// transitively, with some other predicate (the body forms one connected
/// component on variables, ignoring the head).
pub fn is_body_connected(body: &[Predicate]) -> bool {
    if body.len() <= 1 {
        return true;
    }
    let mut parent: Vec<usize> = (0..body.len()).collect();

    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    let mut var_owner: HashMap<usize, usize> = HashMap::new();
    for (idx, pred) in body.iter().enumerate() {
        for v in pred.variables() {
            if let Some(&other) = var_owner.get(&v) {
                let ra = find(&mut parent, idx);
                let rb = find(&mut parent, other);
                if ra != rb {
                    parent[ra] = rb;
                }
            } else {
                var_owner.insert(v, idx);
            }
        }
    }
    let root = find(&mut parent, 0);
    (1..body.len()).all(|i| find(&mut parent, i) == root)
}

/// `true` if `body` contains two predicates with identical symbol and full
/// argument tuple.
pub fn has_duplicate_predicate(body: &[Predicate]) -> bool {
    let mut seen = HashSet::new();
    body.iter().any(|p| !seen.insert((p.symbol, p.args.clone())))
}

/// An argument slot addressed the way `generalize` numbers them: 0 is the
/// head, 1.. are body predicates in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgPosition {
    Head(usize),
    Body(usize, usize),
}

fn arg_at(head: &Predicate, body: &[Predicate], pred_idx: usize, arg_idx: usize) -> Argument {
    if pred_idx == 0 {
        head.args[arg_idx]
    } else {
        body[pred_idx - 1].args[arg_idx]
    }
}

fn set_arg_at(head: &mut Predicate, body: &mut [Predicate], pos: ArgPosition, value: Argument) {
    match pos {
        ArgPosition::Head(i) => head.args[i] = value,
        ArgPosition::Body(pi, ai) => body[pi].args[ai] = value,
    }
}

fn variable_positions(head: &Predicate, body: &[Predicate], var: usize) -> Vec<ArgPosition> {
    let mut out = Vec::new();
    for (i, &a) in head.args.iter().enumerate() {
        if a == Argument::Variable(var) {
            out.push(ArgPosition::Head(i));
        }
    }
    for (pi, pred) in body.iter().enumerate() {
        for (ai, &a) in pred.args.iter().enumerate() {
            if a == Argument::Variable(var) {
                out.push(ArgPosition::Body(pi, ai));
            }
        }
    }
    out
}

/// `true` if the head shares at least one limited variable with some body
/// predicate, directly or (since the body is itself one connected
/// component whenever [`is_body_connected`] holds) transitively. A rule
/// whose head carries no link at all into a non-empty body no longer
/// constrains anything the body entails, so generalizing away the head's
/// last shared variable is rejected rather than producing a degenerate rule.
fn head_linked_to_body(head: &Predicate, body: &[Predicate]) -> bool {
    if body.is_empty() {
        return true;
    }
    let head_vars: HashSet<usize> = head.variables().collect();
    if head_vars.is_empty() {
        return false;
    }
    body.iter().any(|p| p.variables().any(|v| head_vars.contains(&v)))
}

/// Undoes the binding at argument `arg_idx` of predicate `pred_idx` (0 =
/// head, 1.. = body predicates in order): a constant slot reverts to
/// [`Argument::Empty`]; a limited-variable slot reverts to `Empty`, and if
/// that was the variable's second-to-last remaining occurrence, the last
/// one collapses to `Empty` too, since a limited variable bound at only one
/// place carries no information. A body predicate left with every argument
/// `Empty` is dropped entirely, mirroring how cases 1/2/4 always introduce a
/// body predicate already carrying a binding.
///
/// Returns [`UpdateStatus::Invalid`] (and leaves `head`/`body` untouched) if
/// the slot was already empty, or if undoing the binding would disconnect
/// the body or sever the head's last link into it.
pub fn generalize(
    head: &Predicate,
    body: &[Predicate],
    pred_idx: usize,
    arg_idx: usize,
) -> (UpdateStatus, Predicate, Vec<Predicate>) {
    let invalid = || (UpdateStatus::Invalid, head.clone(), body.to_vec());

    let removed_var = match arg_at(head, body, pred_idx, arg_idx) {
        Argument::Empty => return invalid(),
        Argument::Constant(_) => None,
        Argument::Variable(v) => Some(v),
    };

    let mut new_head = head.clone();
    let mut new_body = body.to_vec();
    let pos = if pred_idx == 0 {
        ArgPosition::Head(arg_idx)
    } else {
        ArgPosition::Body(pred_idx - 1, arg_idx)
    };
    set_arg_at(&mut new_head, &mut new_body, pos, Argument::Empty);

    if let Some(v) = removed_var {
        let remaining = variable_positions(&new_head, &new_body, v);
        if remaining.len() == 1 {
            set_arg_at(&mut new_head, &mut new_body, remaining[0], Argument::Empty);
        }
    }

    new_body.retain(|p| !p.args.iter().copied().all(Argument::is_empty));

    if !is_body_connected(&new_body) || !head_linked_to_body(&new_head, &new_body) {
        return invalid();
    }

    (UpdateStatus::Normal, new_head, new_body)
}
