//! Rule structure: predicates, fingerprints, invariants, and text format.

pub mod core;
pub mod text;

pub use core::{
    category_multiset, generalize, has_duplicate_predicate, is_body_connected, Argument,
    Category, Fingerprint, FingerprintCache, Predicate, TabuMap, UpdateStatus,
};
