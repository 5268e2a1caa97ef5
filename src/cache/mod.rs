//! The join cache: shared row-subset handles, connected-fragment joins, and
//! the three-cache bookkeeping a candidate rule carries while it searches.

pub mod cached_rule;
pub mod compliance;
pub mod fragment;

pub use cached_rule::{CachedRule, Grounding, Slot};
pub use compliance::{CbPool, CompliedBlock};
pub use fragment::{CacheFragment, VarInfo};
