//! Candidate rule scoring.
//!
//! A rule's usefulness is summarized as three numbers: how many facts it
//! newly entails (`pos`), how many entailments it produces that are not
//! facts or are already covered (`neg`), and its own textual length
//! (`len`, the number of predicates in its body plus one for the head).
//! [`EvalMetric`] selects how those three numbers are reduced to a single
//! score for beam ranking.

use std::cmp::Ordering;
use std::fmt;

/// Which of the three scoring functions ranks candidates during beam search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalMetric {
    /// Compression ratio: facts explained per unit of cost.
    CompressionRatio,
    /// Compression capacity: net facts saved after paying for rule length.
    CompressionCapacity,
    /// Information gain.
    InformationGain,
}

impl EvalMetric {
    /// Parses the single-character CLI symbol (`τ`, `δ`, or `h`).
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "τ" => Some(EvalMetric::CompressionRatio),
            "δ" => Some(EvalMetric::CompressionCapacity),
            "h" => Some(EvalMetric::InformationGain),
            _ => None,
        }
    }

    /// Renders back to the CLI symbol, for config summaries and `.meta` logs.
    pub fn symbol(self) -> &'static str {
        match self {
            EvalMetric::CompressionRatio => "τ",
            EvalMetric::CompressionCapacity => "δ",
            EvalMetric::InformationGain => "h",
        }
    }
}

impl fmt::Display for EvalMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Default for EvalMetric {
    fn default() -> Self {
        EvalMetric::CompressionRatio
    }
}

/// The `(pos, neg, len)` triple attached to every candidate rule.
///
/// `pos` is the number of facts newly entailed by the rule's current head
/// cache; `neg` is the number of non-fact entailments (everything the rule's
/// extension covers minus what is already entailed, minus `pos`); `len` is
/// the rule's length (body predicate count + 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Eval {
    pos: f64,
    neg: f64,
    len: usize,
}

impl Eval {
    /// `neg` here follows the constructor convention used when a `CachedRule`
    /// is first built: `all_ent - already_ent`, i.e. it still includes `pos`.
    /// [`Eval::new`] subtracts `pos` out so `neg` always means "wrong or
    /// already-covered entailments", never including the newly-covered ones.
    pub fn new(pos: f64, neg_including_pos: f64, len: usize) -> Self {
        Eval {
            pos,
            neg: (neg_including_pos - pos).max(0.0),
            len,
        }
    }

    pub fn pos(&self) -> f64 {
        self.pos
    }

    pub fn neg(&self) -> f64 {
        self.neg
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// The fraction of the head relation's facts this rule currently covers.
    pub fn coverage(&self, head_relation_size: f64) -> f64 {
        if head_relation_size <= 0.0 {
            0.0
        } else {
            self.pos / head_relation_size
        }
    }

    /// Reduces the triple to a single score under `metric`; higher is better.
    pub fn value(&self, metric: EvalMetric) -> f64 {
        match metric {
            EvalMetric::CompressionRatio => self.compression_ratio(),
            EvalMetric::CompressionCapacity => self.compression_capacity(),
            EvalMetric::InformationGain => self.information_gain(),
        }
    }

    /// `τ = pos / (neg + len)`. Always compared against `stopCompressionRatio`
    /// regardless of which metric drives beam ranking.
    pub fn compression_ratio(&self) -> f64 {
        let denom = self.neg + self.len as f64;
        if denom <= 0.0 {
            self.pos
        } else {
            self.pos / denom
        }
    }

    /// `δ = pos - len`.
    pub fn compression_capacity(&self) -> f64 {
        self.pos - self.len as f64
    }

    /// Laplace-smoothed FOIL-style gain, always `<= 0`.
    pub fn information_gain(&self) -> f64 {
        let total = self.pos + self.neg;
        self.pos * ((self.pos + 1.0) / (total + 1.0)).log2()
    }

    /// Orders two evals under `metric`, highest score first.
    pub fn compare(&self, other: &Eval, metric: EvalMetric) -> Ordering {
        self.value(metric)
            .partial_cmp(&other.value(metric))
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for Eval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(pos={}, neg={}, len={})", self.pos, self.neg, self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_round_trips() {
        for metric in [
            EvalMetric::CompressionRatio,
            EvalMetric::CompressionCapacity,
            EvalMetric::InformationGain,
        ] {
            assert_eq!(EvalMetric::from_symbol(metric.symbol()), Some(metric));
        }
    }

    #[test]
    fn unknown_symbol_rejected() {
        assert_eq!(EvalMetric::from_symbol("x"), None);
    }

    #[test]
    fn neg_excludes_pos() {
        let eval = Eval::new(3.0, 10.0, 2);
        assert_eq!(eval.pos(), 3.0);
        assert_eq!(eval.neg(), 7.0);
    }

    #[test]
    fn neg_never_negative() {
        let eval = Eval::new(5.0, 2.0, 1);
        assert_eq!(eval.neg(), 0.0);
    }

    #[test]
    fn compression_ratio_prefers_fewer_negatives() {
        let better = Eval::new(10.0, 10.0, 2);
        let worse = Eval::new(10.0, 100.0, 2);
        assert!(better.compression_ratio() > worse.compression_ratio());
    }

    #[test]
    fn compression_capacity_penalizes_length() {
        let short = Eval::new(10.0, 0.0, 1);
        let long = Eval::new(10.0, 0.0, 5);
        assert!(short.compression_capacity() > long.compression_capacity());
    }

    #[test]
    fn information_gain_is_nonpositive_and_monotone() {
        let clean = Eval::new(10.0, 0.0, 1);
        let noisy = Eval::new(10.0, 10.0, 1);
        assert!(clean.information_gain() <= 0.0);
        assert!(noisy.information_gain() <= 0.0);
        assert!(clean.information_gain() > noisy.information_gain());
    }

    #[test]
    fn zero_relation_coverage_is_zero() {
        let eval = Eval::new(0.0, 0.0, 1);
        assert_eq!(eval.coverage(0.0), 0.0);
    }

    #[test]
    fn compare_orders_by_selected_metric() {
        let a = Eval::new(10.0, 0.0, 1);
        let b = Eval::new(5.0, 0.0, 1);
        assert_eq!(a.compare(&b, EvalMetric::CompressionCapacity), Ordering::Greater);
    }
}
