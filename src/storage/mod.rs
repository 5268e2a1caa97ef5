//! Flat on-disk KB format: relation catalog, binary row files, constant
//! name maps, and the compressed-KB artifacts (`rules.hyp`,
//! `supplementary.cst`, `.ceg` counterexamples).

pub mod dump;
pub mod rel_file;

pub use dump::{dump_compressed_kb, load_kb};
