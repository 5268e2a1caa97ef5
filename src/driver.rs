//! Top-level orchestration: load a KB, mine every target relation to
//! exhaustion, run dependency analysis over the accepted rule set, and dump
//! the compressed KB back to disk.

use std::collections::HashSet;
use std::io::BufRead;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{info, warn};

use crate::cache::{CachedRule, CbPool, Grounding};
use crate::config::SincConfig;
use crate::dependency;
use crate::errors::SincError;
use crate::kb::simple_kb::{SimpleCompressedKb, SimpleKb};
use crate::miner::{MinerConfig, RelationMiner};
use crate::rule::core::Argument;
use crate::rule::text::rule_to_string;
use crate::storage;

/// Installs a SIGINT handler flipping a shared flag, and optionally a
/// background thread watching stdin for a bare `stop` sentinel line. Both
/// feed the same flag the beam search polls once per expansion.
pub fn install_interrupt_handler(watch_stdin: bool) -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));

    let for_signal = Arc::clone(&flag);
    if let Err(err) = ctrlc::set_handler(move || for_signal.store(true, Ordering::Relaxed)) {
        warn!(%err, "failed to install SIGINT handler");
    }

    if watch_stdin {
        let for_stdin = Arc::clone(&flag);
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines().map_while(Result::ok) {
                if line.trim() == "stop" {
                    for_stdin.store(true, Ordering::Relaxed);
                    break;
                }
            }
        });
    }

    flag
}

fn miner_config(config: &SincConfig) -> MinerConfig {
    MinerConfig {
        beam_width: config.beam_width,
        metric: config.eval_metric,
        min_fact_coverage: config.min_fact_coverage,
        min_constant_coverage: config.min_constant_coverage,
        stop_compression_ratio: config.stop_compression_ratio,
        observation_ratio: config.observation_ratio,
    }
}

fn record_constants(rule: &CachedRule, used: &mut HashSet<i32>) {
    for arg in &rule.head().args {
        if let Argument::Constant(c) = arg {
            used.insert(*c);
        }
    }
    for pred in rule.body() {
        for arg in &pred.args {
            if let Argument::Constant(c) = arg {
                used.insert(*c);
            }
        }
    }
}

/// Mines `target_relation` to exhaustion: repeatedly finds the best rule,
/// records it, marks its newly-entailed facts, and stops when no rule
/// clears the acceptance bar or the interrupt flag fires.
fn mine_relation(
    target_relation: usize,
    kb: &mut SimpleKb,
    pool: &mut CbPool,
    config: &MinerConfig,
    interrupt: &AtomicBool,
    compressed: &mut SimpleCompressedKb,
    rule_groundings: &mut Vec<(usize, Vec<Grounding>)>,
    used_constants: &mut HashSet<i32>,
) {
    loop {
        if interrupt.load(Ordering::Relaxed) {
            return;
        }

        let relation_miner = RelationMiner::new(config, interrupt);
        let Some(rule) = relation_miner.find_rule(target_relation, kb, pool) else {
            return;
        };
        if rule.body().is_empty() {
            return;
        }

        record_constants(&rule, used_constants);
        let rule_text = rule_to_string(rule.head(), rule.body(), kb.catalog());
        info!(relation = target_relation, rule = %rule_text, "accepted rule");
        compressed.add_hypothesis_rule(rule_text);

        rule_groundings.push((target_relation, rule.groundings(kb)));

        let counterexamples = rule.counterexamples(kb);
        if !counterexamples.is_empty() {
            let records: Vec<Rc<_>> = counterexamples.into_iter().map(Rc::new).collect();
            compressed.add_counterexamples(target_relation, records);
        }

        if rule.mark_entailment(kb).is_empty() {
            return;
        }
    }
}

/// Runs the full pipeline: load, mine every target relation, analyze
/// dependencies, dump. Returns the compressed KB it wrote (mainly useful
/// for tests that want to inspect the result without re-reading the disk).
pub fn run(config: &SincConfig, interrupt: &AtomicBool) -> Result<SimpleCompressedKb, SincError> {
    if config.validate {
        warn!("decompression validation (-v) is not implemented; continuing without it");
    }

    let mut kb = storage::load_kb(&config.input)?;
    info!(
        relations = kb.total_relations(),
        records = kb.total_records(),
        "loaded KB"
    );

    let config_for_miner = miner_config(config);
    let resolved_output = config.resolved_output();
    let mut compressed = SimpleCompressedKb::new(resolved_output.name.clone());
    let mut pool = CbPool::new();
    let mut rule_groundings: Vec<(usize, Vec<Grounding>)> = Vec::new();
    let mut used_constants: HashSet<i32> = HashSet::new();

    for target_relation in kb.target_relations(config.max_relations) {
        pool.clear();
        mine_relation(
            target_relation,
            &mut kb,
            &mut pool,
            &config_for_miner,
            interrupt,
            &mut compressed,
            &mut rule_groundings,
            &mut used_constants,
        );
        if interrupt.load(Ordering::Relaxed) {
            warn!(relation = target_relation, "mining interrupted");
        }
    }

    let necessary = dependency::necessary_facts(&kb, &rule_groundings);
    for fact in &necessary {
        compressed.add_fvs_record(fact.relation_id, Rc::new(fact.record.clone()));
        used_constants.extend(fact.record.as_slice());
    }
    info!(
        necessary = compressed.total_necessary_records(),
        counterexamples = compressed.total_counterexamples(),
        rules = compressed.total_hypothesis_size(),
        "dependency analysis complete"
    );

    let supplementary: Vec<i32> = kb
        .all_constants()
        .into_iter()
        .filter(|c| !used_constants.contains(c))
        .collect();
    compressed.update_supplementary_constants(supplementary);

    storage::dump_compressed_kb(&resolved_output, &kb, &compressed)?;
    info!(output = %resolved_output.name, "wrote compressed KB");

    Ok(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KbLocation;
    use crate::eval::EvalMetric;
    use crate::kb::catalog::Catalog;
    use crate::kb::record::Record;
    use crate::kb::relation::SimpleRelation;

    fn family_kb_location() -> KbLocation {
        let dir = tempfile::tempdir().unwrap().into_path();
        let location = KbLocation {
            path: dir,
            name: "family".to_string(),
        };

        let mut catalog = Catalog::new();
        catalog.register_constant(1, "alice");
        catalog.register_constant(2, "bob");
        catalog.register_constant(3, "carol");
        let family_id = catalog.register_relation("family");
        let mother_id = catalog.register_relation("mother");

        let family = SimpleRelation::new(
            family_id,
            "family",
            vec![Record::new(vec![1, 2, 3])],
        );
        let mother = SimpleRelation::new(mother_id, "mother", vec![Record::new(vec![1, 3])]);

        let kb = SimpleKb::new("family", vec![family, mother], catalog);
        storage::dump_compressed_kb(
            &location,
            &kb,
            &{
                let mut compressed = SimpleCompressedKb::new("unused");
                for relation in kb.relations() {
                    for record in relation.records() {
                        compressed.add_fvs_record(relation.id(), record.clone());
                    }
                }
                compressed
            },
        )
        .unwrap();
        location
    }

    #[test]
    fn run_mines_and_writes_a_compressed_kb() {
        let input = family_kb_location();
        let config = SincConfig {
            input: input.clone(),
            output: KbLocation {
                path: input.path.clone(),
                name: String::new(),
            },
            neg_kb: None,
            neg_budget_factor: 2.0,
            weight_negatives: false,
            threads: 1,
            validate: false,
            max_relations: 0,
            beam_width: 5,
            eval_metric: EvalMetric::CompressionRatio,
            min_fact_coverage: 0.05,
            min_constant_coverage: 0.25,
            stop_compression_ratio: 1.0,
            observation_ratio: 0.0,
            logging: crate::config::LoggingConfig::default(),
        };
        let interrupt = AtomicBool::new(false);

        let compressed = run(&config, &interrupt).unwrap();
        assert!(compressed.total_necessary_records() > 0 || compressed.total_hypothesis_size() > 0);

        let output_dir = config.resolved_output().path.join(config.resolved_output().name);
        assert!(output_dir.join("Relations.tsv").exists());
        assert!(output_dir.join("rules.hyp").exists());
        assert!(output_dir.join("supplementary.cst").exists());
    }
}
