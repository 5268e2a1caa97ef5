//! Full load → mine → dependency-analyze → dump pipeline against the small
//! family/mother/father knowledge base.

use std::sync::atomic::AtomicBool;

use sinc::config::{KbLocation, LoggingConfig, SincConfig};
use sinc::eval::EvalMetric;
use sinc::kb::catalog::Catalog;
use sinc::kb::record::Record;
use sinc::kb::relation::SimpleRelation;
use sinc::kb::simple_kb::{SimpleCompressedKb, SimpleKb};
use sinc::{driver, storage};

fn seed_family_kb() -> KbLocation {
    let dir = tempfile::tempdir().unwrap().into_path();
    let location = KbLocation {
        path: dir,
        name: "family".to_string(),
    };

    let mut catalog = Catalog::new();
    for (numeration, name) in [
        (4, "n4"),
        (5, "n5"),
        (6, "n6"),
        (7, "n7"),
        (8, "n8"),
        (9, "n9"),
        (10, "n10"),
        (11, "n11"),
        (12, "n12"),
        (13, "n13"),
        (14, "n14"),
        (15, "n15"),
        (16, "n16"),
        (17, "n17"),
    ] {
        catalog.register_constant(numeration, name);
    }

    let family_id = catalog.register_relation("family");
    let mother_id = catalog.register_relation("mother");
    let father_id = catalog.register_relation("father");

    let family = SimpleRelation::new(
        family_id,
        "family",
        vec![
            Record::new(vec![4, 5, 6]),
            Record::new(vec![7, 8, 9]),
            Record::new(vec![10, 11, 12]),
            Record::new(vec![13, 14, 15]),
        ],
    );
    let mother = SimpleRelation::new(
        mother_id,
        "mother",
        vec![
            Record::new(vec![4, 6]),
            Record::new(vec![7, 9]),
            Record::new(vec![10, 12]),
            Record::new(vec![13, 15]),
        ],
    );
    let father = SimpleRelation::new(
        father_id,
        "father",
        vec![
            Record::new(vec![5, 6]),
            Record::new(vec![8, 9]),
            Record::new(vec![11, 12]),
            Record::new(vec![16, 17]),
        ],
    );

    let kb = SimpleKb::new("family", vec![family, mother, father], catalog);

    // Seed the on-disk layout by round-tripping every relation's own
    // records through the dump path (there is no separate "write a fresh
    // KB" helper; dump_compressed_kb's per-relation `.rel` writer is the
    // on-disk row format regardless of why a record is "necessary").
    let mut seed = SimpleCompressedKb::new("unused");
    for relation in kb.relations() {
        for record in relation.records() {
            seed.add_fvs_record(relation.id(), record.clone());
        }
    }
    storage::dump_compressed_kb(&location, &kb, &seed).unwrap();
    location
}

#[test]
fn mining_compresses_the_family_kb() {
    let input = seed_family_kb();
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
        eval_metric: EvalMetric::CompressionCapacity,
        min_fact_coverage: 0.05,
        min_constant_coverage: 0.25,
        stop_compression_ratio: 1.0,
        observation_ratio: 0.0,
        logging: LoggingConfig::default(),
    };
    let interrupt = AtomicBool::new(false);

    let compressed = driver::run(&config, &interrupt).unwrap();

    // The family relation generalizes its own sub-columns into mother and
    // father facts, and father/mother jointly reconstruct family, so the
    // miner should find at least one rule and need fewer than all 12
    // original records kept verbatim.
    assert!(compressed.total_hypothesis_size() > 0, "expected at least one accepted rule");
    assert!(
        compressed.total_necessary_records() < 12,
        "expected compression to drop some records from the residual set, kept {}",
        compressed.total_necessary_records()
    );

    let output_dir = config.resolved_output().path.join(config.resolved_output().name);
    assert!(output_dir.join("Relations.tsv").exists());
    assert!(output_dir.join("rules.hyp").exists());
    assert!(output_dir.join("supplementary.cst").exists());

    // Every constant used by a kept rule or a necessary record must not be
    // in the supplementary set; constants used nowhere at all must be.
    let supplementary = compressed.supplementary_constants();
    assert!(
        supplementary.iter().all(|c| (4..=17).contains(c)),
        "supplementary constants must come from the original KB's constant set"
    );
}

#[test]
fn zero_row_relation_yields_no_rules_for_itself() {
    let dir = tempfile::tempdir().unwrap().into_path();
    let location = KbLocation {
        path: dir,
        name: "empty".to_string(),
    };

    let mut catalog = Catalog::new();
    let empty_id = catalog.register_relation("empty_rel");
    let empty_rel = SimpleRelation::new(empty_id, "empty_rel", vec![]);
    let kb = SimpleKb::new("empty", vec![empty_rel], catalog);
    storage::dump_compressed_kb(&location, &kb, &SimpleCompressedKb::new("unused")).unwrap();

    let config = SincConfig {
        input: location.clone(),
        output: KbLocation {
            path: location.path.clone(),
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
        logging: LoggingConfig::default(),
    };
    let interrupt = AtomicBool::new(false);

    let compressed = driver::run(&config, &interrupt).unwrap();
    assert_eq!(compressed.total_hypothesis_size(), 0);
    assert_eq!(compressed.total_necessary_records(), 0);
    assert_eq!(compressed.total_counterexamples(), 0);
}
