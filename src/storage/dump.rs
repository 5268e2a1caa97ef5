//! Whole-KB I/O: `Relations.tsv`, `mapN.tsv` constant maps, and — for a
//! compressed KB — `rules.hyp`, `<id>.ceg`, `supplementary.cst`.

use std::fs;
use std::path::Path;

use crate::config::KbLocation;
use crate::errors::KbIoError;
use crate::kb::catalog::Catalog;
use crate::kb::relation::SimpleRelation;
use crate::kb::simple_kb::{SimpleCompressedKb, SimpleKb};
use crate::storage::rel_file;

const MAP_FILE_CHUNK: i32 = 1_000_000;

fn kb_dir(location: &KbLocation) -> std::path::PathBuf {
    location.path.join(&location.name)
}

fn load_constant_maps(dir: &Path, catalog: &mut Catalog) -> Result<(), KbIoError> {
    let mut block = 1i32;
    loop {
        let path = dir.join(format!("map{block}.tsv"));
        if !path.exists() {
            return Ok(());
        }
        let content = fs::read_to_string(&path).map_err(|e| KbIoError::io(&path, e))?;
        for (idx, line) in content.lines().enumerate() {
            let numeration = (block - 1) * MAP_FILE_CHUNK + idx as i32 + 1;
            catalog.register_constant(numeration, line);
        }
        block += 1;
    }
}

fn dump_constant_maps(dir: &Path, catalog: &Catalog) -> Result<(), KbIoError> {
    let constants = catalog.constants();
    if constants.is_empty() {
        return Ok(());
    }
    let mut block = 1i32;
    let mut idx = 0usize;
    while idx < constants.len() {
        let mut lines = Vec::new();
        let block_start = (block - 1) * MAP_FILE_CHUNK;
        let block_end = block * MAP_FILE_CHUNK;
        while idx < constants.len() && constants[idx].0 < block_end {
            if constants[idx].0 < block_start {
                return Err(KbIoError::MissingMapFile(block as usize));
            }
            lines.push(constants[idx].1.to_string());
            idx += 1;
        }
        let path = dir.join(format!("map{block}.tsv"));
        fs::write(&path, lines.join("\n") + "\n").map_err(|e| KbIoError::io(&path, e))?;
        block += 1;
    }
    Ok(())
}

/// Loads a `Relations.tsv` + per-relation `.rel` + `mapN.tsv` KB directory.
pub fn load_kb(location: &KbLocation) -> Result<SimpleKb, KbIoError> {
    let dir = kb_dir(location);
    let tsv_path = dir.join("Relations.tsv");
    let content = fs::read_to_string(&tsv_path).map_err(|e| KbIoError::io(&tsv_path, e))?;

    let mut catalog = Catalog::new();
    load_constant_maps(&dir, &mut catalog)?;

    let mut relations = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let mut fields = line.split('\t');
        let name = fields.next().ok_or_else(|| KbIoError::BadCatalogLine {
            path: tsv_path.clone(),
            line: line_no + 1,
            reason: "missing relation name".to_string(),
        })?;
        let arity: usize = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| KbIoError::BadCatalogLine {
                path: tsv_path.clone(),
                line: line_no + 1,
                reason: "missing/invalid arity".to_string(),
            })?;
        let row_count: usize = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| KbIoError::BadCatalogLine {
                path: tsv_path.clone(),
                line: line_no + 1,
                reason: "missing/invalid row count".to_string(),
            })?;

        let id = catalog.register_relation(name);
        let rel_path = dir.join(format!("{id}.rel"));
        let records = rel_file::read(&rel_path, arity, row_count)?;
        relations.push(SimpleRelation::new(id, name, records));
    }

    Ok(SimpleKb::new(location.name.clone(), relations, catalog))
}

/// Writes the full compressed KB: FVS-selected necessary facts (as the
/// output KB's own `Relations.tsv`/`.rel` pair), counterexamples (`.ceg`),
/// the rule hypothesis (`rules.hyp`), and supplementary constants
/// (`supplementary.cst`).
pub fn dump_compressed_kb(
    location: &KbLocation,
    kb: &SimpleKb,
    compressed: &SimpleCompressedKb,
) -> Result<(), KbIoError> {
    let dir = kb_dir(location);
    fs::create_dir_all(&dir).map_err(|e| KbIoError::io(&dir, e))?;

    let mut tsv = String::new();
    for relation in kb.relations() {
        let necessary = compressed.fvs_records(relation.id());
        tsv.push_str(&format!("{}\t{}\t{}\n", relation.name(), relation.arity(), necessary.len()));

        let rel_path = dir.join(format!("{}.rel", relation.id()));
        rel_file::write(&rel_path, necessary.iter().map(|r| r.as_ref()))?;

        let counterexamples = compressed.counterexample_set(relation.id());
        let ceg_path = dir.join(format!("{}.ceg", relation.id()));
        rel_file::write(&ceg_path, counterexamples.iter().map(|r| r.as_ref()))?;
    }
    let tsv_path = dir.join("Relations.tsv");
    fs::write(&tsv_path, tsv).map_err(|e| KbIoError::io(&tsv_path, e))?;

    let hyp_path = dir.join("rules.hyp");
    let hyp_body = compressed.hypothesis().join("\n");
    fs::write(&hyp_path, if hyp_body.is_empty() { hyp_body } else { hyp_body + "\n" })
        .map_err(|e| KbIoError::io(&hyp_path, e))?;

    rel_file::write_int_list(&dir.join("supplementary.cst"), compressed.supplementary_constants())?;
    dump_constant_maps(&dir, kb.catalog())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::record::Record;
    use std::rc::Rc;

    fn sample_kb() -> (KbLocation, SimpleKb) {
        let dir = tempfile::tempdir().unwrap();
        let location = KbLocation {
            path: dir.into_path(),
            name: "family".to_string(),
        };
        let mut catalog = Catalog::new();
        catalog.register_constant(4, "a");
        catalog.register_constant(5, "b");
        catalog.register_constant(6, "c");
        let id = catalog.register_relation("family");
        let rel = SimpleRelation::new(id, "family", vec![Record::new(vec![4, 5, 6])]);
        (location, SimpleKb::new("family", vec![rel], catalog))
    }

    #[test]
    fn dump_then_load_round_trips_necessary_facts() {
        let (location, kb) = sample_kb();
        let mut compressed = SimpleCompressedKb::new("family_comp");
        compressed.add_fvs_record(0, Rc::new(Record::new(vec![4, 5, 6])));
        compressed.update_supplementary_constants(vec![4, 5, 6]);

        dump_compressed_kb(&location, &kb, &compressed).unwrap();
        let loaded = load_kb(&location).unwrap();

        assert_eq!(loaded.total_relations(), 1);
        assert_eq!(loaded.relation(0).unwrap().total_rows(), 1);
        assert_eq!(loaded.relation(0).unwrap().record(0).as_slice(), &[4, 5, 6]);
    }

    #[test]
    fn supplementary_constants_round_trip() {
        let (location, kb) = sample_kb();
        let mut compressed = SimpleCompressedKb::new("family_comp");
        compressed.update_supplementary_constants(vec![4, 5, 6]);
        dump_compressed_kb(&location, &kb, &compressed).unwrap();

        let dir = kb_dir(&location);
        let values = rel_file::read_int_list(&dir.join("supplementary.cst")).unwrap();
        assert_eq!(values, vec![4, 5, 6]);
    }
}
