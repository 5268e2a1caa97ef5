//! Post-mining dependency analysis: which facts must survive as residual
//! data so the accepted rule set can reconstruct the rest of the target
//! relations.
//!
//! Every ground fact is a node. Each accepted rule's groundings add an edge
//! from its newly-entailed head fact to every body fact that justified it.
//! A fact no accepted rule ever entails points at a synthetic AXIOM node,
//! since it has no derivation and must be kept verbatim. Strongly connected
//! components reveal cyclic justification chains (`a` entailed via `b`,
//! `b` via `a`); inside each non-trivial one, a minimum feedback-vertex set
//! is kept as residual data to break the cycle when rewriting.

use std::collections::{HashMap, HashSet};

use crate::cache::Grounding;
use crate::kb::record::Record;
use crate::kb::simple_kb::SimpleKb;

/// A fact in the dependency graph: a relation id plus its argument tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactId {
    pub relation_id: usize,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    Fact(FactId),
    Axiom,
}

#[derive(Debug, Default)]
struct Graph {
    nodes: Vec<Node>,
    index: HashMap<Node, usize>,
    edges: Vec<HashSet<usize>>,
}

impl Graph {
    fn node_id(&mut self, node: Node) -> usize {
        if let Some(&id) = self.index.get(&node) {
            return id;
        }
        let id = self.nodes.len();
        self.index.insert(node.clone(), id);
        self.nodes.push(node);
        self.edges.push(HashSet::new());
        id
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        self.edges[from].insert(to);
    }
}

/// Builds the dependency graph: every fact in every relation is a node
/// up front (so facts untouched by any rule still resolve), then every
/// grounding of `rule_groundings` wires head → body edges, and finally
/// every fact that was never a grounding's head gets an edge to AXIOM.
fn build_graph(kb: &SimpleKb, rule_groundings: &[(usize, Vec<Grounding>)]) -> Graph {
    let mut graph = Graph::default();
    let axiom = graph.node_id(Node::Axiom);

    for relation in kb.relations() {
        for record in relation.records() {
            graph.node_id(Node::Fact(FactId {
                relation_id: relation.id(),
                record: (**record).clone(),
            }));
        }
    }

    let mut has_derivation = HashSet::new();
    for (target_relation, groundings) in rule_groundings {
        for grounding in groundings {
            let head_id = graph.node_id(Node::Fact(FactId {
                relation_id: *target_relation,
                record: grounding.head.clone(),
            }));
            has_derivation.insert(head_id);
            for (relation_id, record) in &grounding.body {
                let body_id = graph.node_id(Node::Fact(FactId {
                    relation_id: *relation_id,
                    record: record.clone(),
                }));
                graph.add_edge(head_id, body_id);
            }
        }
    }

    let fact_ids: Vec<usize> = (0..graph.nodes.len()).filter(|&id| id != axiom).collect();
    for id in fact_ids {
        if !has_derivation.contains(&id) {
            graph.add_edge(id, axiom);
        }
    }

    graph
}

/// Tarjan's algorithm, iterative to avoid recursion depth on large KBs.
fn tarjan_scc(graph: &Graph) -> Vec<Vec<usize>> {
    let n = graph.nodes.len();
    let mut indices: Vec<Option<usize>> = vec![None; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut sccs = Vec::new();
    let mut counter = 0usize;

    enum Frame {
        Enter(usize),
        Exit(usize),
    }

    for start in 0..n {
        if indices[start].is_some() {
            continue;
        }
        let mut work = vec![Frame::Enter(start)];

        while let Some(frame) = work.pop() {
            match frame {
                Frame::Enter(v) => {
                    if indices[v].is_some() {
                        continue;
                    }
                    indices[v] = Some(counter);
                    lowlink[v] = counter;
                    counter += 1;
                    stack.push(v);
                    on_stack[v] = true;
                    work.push(Frame::Exit(v));
                    for &w in &graph.edges[v] {
                        if indices[w].is_none() {
                            work.push(Frame::Enter(w));
                        } else if on_stack[w] {
                            lowlink[v] = lowlink[v].min(indices[w].unwrap());
                        }
                    }
                }
                Frame::Exit(v) => {
                    for &w in &graph.edges[v] {
                        if on_stack[w] {
                            lowlink[v] = lowlink[v].min(lowlink[w]);
                        }
                    }
                    if lowlink[v] == indices[v].unwrap() {
                        let mut component = Vec::new();
                        while let Some(w) = stack.pop() {
                            on_stack[w] = false;
                            component.push(w);
                            if w == v {
                                break;
                            }
                        }
                        sccs.push(component);
                    }
                }
            }
        }
    }

    sccs
}

fn is_acyclic(nodes: &[usize], removed: &HashSet<usize>, graph: &Graph) -> bool {
    let active: HashSet<usize> = nodes.iter().copied().filter(|n| !removed.contains(n)).collect();
    let mut state: HashMap<usize, u8> = HashMap::new();

    fn visit(v: usize, active: &HashSet<usize>, graph: &Graph, state: &mut HashMap<usize, u8>) -> bool {
        match state.get(&v) {
            Some(1) => return false,
            Some(2) => return true,
            _ => {}
        }
        state.insert(v, 1);
        for &w in &graph.edges[v] {
            if active.contains(&w) && !visit(w, active, graph, state) {
                return false;
            }
        }
        state.insert(v, 2);
        true
    }

    for &v in &active {
        if !matches!(state.get(&v), Some(2)) && !visit(v, &active, graph, &mut state) {
            return false;
        }
    }
    true
}

fn combinations(items: &[usize], k: usize) -> Vec<Vec<usize>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    if items.len() < k {
        return Vec::new();
    }
    let mut result = Vec::new();
    let first = items[0];
    for mut combo in combinations(&items[1..], k - 1) {
        combo.insert(0, first);
        result.push(combo);
    }
    result.extend(combinations(&items[1..], k));
    result
}

/// A feedback-vertex set of minimum size for the induced subgraph on `nodes`.
/// Exhaustive by subset size; the KBs this miner targets keep SCCs small
/// enough that this never needs to explore past a handful of candidates.
fn minimum_fvs(nodes: &[usize], graph: &Graph) -> HashSet<usize> {
    if is_acyclic(nodes, &HashSet::new(), graph) {
        return HashSet::new();
    }
    for k in 1..=nodes.len() {
        for combo in combinations(nodes, k) {
            let removed: HashSet<usize> = combo.into_iter().collect();
            if is_acyclic(nodes, &removed, graph) {
                return removed;
            }
        }
    }
    nodes.iter().copied().collect()
}

fn has_self_loop(v: usize, graph: &Graph) -> bool {
    graph.edges[v].contains(&v)
}

/// Runs dependency analysis over every relation's facts and the groundings
/// of the accepted rule set (paired with each rule's target relation id),
/// returning the facts that must be kept verbatim in the compressed KB.
pub fn necessary_facts(kb: &SimpleKb, rule_groundings: &[(usize, Vec<Grounding>)]) -> HashSet<FactId> {
    let graph = build_graph(kb, rule_groundings);
    let sccs = tarjan_scc(&graph);
    let mut necessary = HashSet::new();

    for scc in &sccs {
        let non_trivial = scc.len() > 1 || (scc.len() == 1 && has_self_loop(scc[0], &graph));
        if !non_trivial {
            continue;
        }
        for id in minimum_fvs(scc, &graph) {
            if let Node::Fact(fact) = &graph.nodes[id] {
                necessary.insert(fact.clone());
            }
        }
    }

    let axiom_id = graph.index[&Node::Axiom];
    for (id, node) in graph.nodes.iter().enumerate() {
        if let Node::Fact(fact) = node {
            if graph.edges[id].contains(&axiom_id) {
                necessary.insert(fact.clone());
            }
        }
    }

    necessary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::catalog::Catalog;
    use crate::kb::relation::SimpleRelation;

    fn kb_with(relation_id: usize, name: &str, rows: Vec<Vec<i32>>) -> SimpleKb {
        let mut catalog = Catalog::new();
        let id = catalog.register_relation(name);
        assert_eq!(id, relation_id);
        let rel = SimpleRelation::new(id, name, rows.into_iter().map(Record::new).collect());
        SimpleKb::new("kb", vec![rel], catalog)
    }

    #[test]
    fn untouched_fact_is_marked_necessary() {
        let kb = kb_with(0, "parent", vec![vec![1, 2]]);
        let necessary = necessary_facts(&kb, &[]);
        assert_eq!(necessary.len(), 1);
        assert!(necessary.contains(&FactId {
            relation_id: 0,
            record: Record::new(vec![1, 2]),
        }));
    }

    #[test]
    fn entailed_fact_with_acyclic_support_is_not_necessary() {
        let kb = kb_with(0, "ancestor", vec![vec![1, 2], vec![2, 3]]);
        let rule_groundings = vec![(
            0,
            vec![Grounding {
                head: Record::new(vec![1, 2]),
                body: vec![(0, Record::new(vec![2, 3]))],
            }],
        )];
        let necessary = necessary_facts(&kb, &rule_groundings);
        assert!(!necessary.contains(&FactId {
            relation_id: 0,
            record: Record::new(vec![1, 2]),
        }));
        assert!(necessary.contains(&FactId {
            relation_id: 0,
            record: Record::new(vec![2, 3]),
        }));
    }

    #[test]
    fn mutual_entailment_cycle_keeps_exactly_one_side() {
        let kb = kb_with(0, "linked", vec![vec![1, 2], vec![2, 1]]);
        let rule_groundings = vec![(
            0,
            vec![
                Grounding {
                    head: Record::new(vec![1, 2]),
                    body: vec![(0, Record::new(vec![2, 1]))],
                },
                Grounding {
                    head: Record::new(vec![2, 1]),
                    body: vec![(0, Record::new(vec![1, 2]))],
                },
            ],
        )];
        let necessary = necessary_facts(&kb, &rule_groundings);
        assert_eq!(necessary.len(), 1);
    }

    #[test]
    fn self_loop_grounding_is_kept() {
        let kb = kb_with(0, "weird", vec![vec![1, 1]]);
        let rule_groundings = vec![(
            0,
            vec![Grounding {
                head: Record::new(vec![1, 1]),
                body: vec![(0, Record::new(vec![1, 1]))],
            }],
        )];
        let necessary = necessary_facts(&kb, &rule_groundings);
        assert_eq!(necessary.len(), 1);
    }
}
