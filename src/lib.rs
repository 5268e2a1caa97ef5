//! SInC mines first-order Horn rules over a relational knowledge base and
//! rewrites it into a compressed form: a rule hypothesis plus whatever
//! residual facts the rules can't re-derive.

pub mod cache;
pub mod config;
pub mod dependency;
pub mod driver;
pub mod errors;
pub mod estimate;
pub mod eval;
pub mod kb;
pub mod logging;
pub mod miner;
pub mod rule;
pub mod storage;
