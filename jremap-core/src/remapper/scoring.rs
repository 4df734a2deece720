//! Pairwise Method Scoring
//!
//! Combines feature overlaps of two normalized methods into a bounded score
//! in `[0, ~2.7]`.
//!
//! # Algorithm
//! | Component | Measure | Weight |
//! |-----------|---------|--------|
//! | normalized descriptor | equality | 1.0 |
//! | canonical invoked tokens | IDF-weighted Jaccard | 0.5 |
//! | string constants | IDF-weighted Jaccard | 0.3 |
//! | opcode histogram keys | overlap coefficient | 0.2 |
//! | field-operation patterns | Jaccard | 0.7 |
//!
//! The sum is scaled by `0.5 + 0.5 · min(complexity)` and then by a
//! plumbing penalty (×0.2 when both sides are plumbing-only, ×0.4 when one is).

use crate::remapper::corpus::CorpusStats;
use crate::remapper::descriptor::ObjectCompatibility;
use crate::remapper::normalize::NormalizedMethod;
use crate::remapper::similarity::{jaccard, key_overlap, weighted_jaccard};
use serde::{Deserialize, Serialize};

pub const DESCRIPTOR_WEIGHT: f64 = 1.0;
pub const INVOKED_WEIGHT: f64 = 0.5;
pub const STRING_WEIGHT: f64 = 0.3;
pub const OPCODE_WEIGHT: f64 = 0.2;
pub const FIELD_PATTERN_WEIGHT: f64 = 0.7;

const BOTH_PLUMBING_PENALTY: f64 = 0.2;
const ONE_PLUMBING_PENALTY: f64 = 0.4;

/// Per-component view of one pair score, for auditing a match.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// 1.0 when normalized descriptors are equal.
    pub descriptor: f64,
    pub invoked: f64,
    pub strings: f64,
    pub opcodes: f64,
    pub field_patterns: f64,
    /// Weighted sum before scaling.
    pub raw: f64,
    pub complexity_multiplier: f64,
    pub plumbing_penalty: f64,
    pub total: f64,
}

/// Structural pre-filter; `false` rejects the pair before scoring.
///
/// Rejects pairs whose names disagree on the obfuscator's two-character
/// convention, or whose argument shapes are incompatible.
pub fn prefilter(a: &NormalizedMethod, b: &NormalizedMethod, compatibility: ObjectCompatibility) -> bool {
    let short_a = a.key().name.len() == 2;
    let short_b = b.key().name.len() == 2;
    short_a == short_b && compatibility.compatible(a.descriptor(), b.descriptor())
}

/// Score two methods. Symmetric and deterministic.
#[inline]
pub fn score(a: &NormalizedMethod, b: &NormalizedMethod, stats: &CorpusStats) -> f64 {
    score_breakdown(a, b, stats).total
}

/// Score two methods, keeping every component.
pub fn score_breakdown(a: &NormalizedMethod, b: &NormalizedMethod, stats: &CorpusStats) -> ScoreBreakdown {
    let descriptor = if a.normalized_descriptor() == b.normalized_descriptor() { 1.0 } else { 0.0 };
    let invoked = weighted_jaccard(&stats.invoked_idf, a.canonical_invoked(), b.canonical_invoked());
    let strings = weighted_jaccard(&stats.string_idf, a.strings(), b.strings());
    let opcodes = key_overlap(a.opcode_histogram(), b.opcode_histogram());
    let field_patterns = jaccard(a.field_patterns(), b.field_patterns());

    let raw = descriptor * DESCRIPTOR_WEIGHT
        + invoked * INVOKED_WEIGHT
        + strings * STRING_WEIGHT
        + opcodes * OPCODE_WEIGHT
        + field_patterns * FIELD_PATTERN_WEIGHT;

    let complexity_multiplier = 0.5 + 0.5 * a.complexity().min(b.complexity());

    let plumbing_penalty = match (a.is_plumbing_only(), b.is_plumbing_only()) {
        (true, true) => BOTH_PLUMBING_PENALTY,
        (true, false) | (false, true) => ONE_PLUMBING_PENALTY,
        (false, false) => 1.0,
    };

    ScoreBreakdown {
        descriptor,
        invoked,
        strings,
        opcodes,
        field_patterns,
        raw,
        complexity_multiplier,
        plumbing_penalty,
        total: raw * complexity_multiplier * plumbing_penalty,
    }
}

/// Blend a score toward 1.0 when the owner classes were matched.
#[inline]
pub fn class_boost(score: f64, weight: f64) -> f64 {
    score * (1.0 - weight) + weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remapper::bytecode::{opcodes, Constant, Insn};
    use crate::remapper::model::MethodRecord;

    fn normalized(name: &str, desc: &str, instructions: Vec<Insn>) -> NormalizedMethod {
        let record = MethodRecord {
            name: name.to_string(),
            descriptor: desc.to_string(),
            access: 0,
            instructions,
            try_catch_blocks: Vec::new(),
        };
        NormalizedMethod::from_record("ow", &record).unwrap()
    }

    fn calls(targets: &[&str]) -> Vec<Insn> {
        let mut insns: Vec<Insn> = targets
            .iter()
            .map(|t| Insn::Method {
                op: opcodes::INVOKESTATIC,
                owner: "java/lang/Math".into(),
                name: t.to_string(),
                desc: "(I)I".into(),
            })
            .collect();
        insns.push(Insn::Simple { op: opcodes::IRETURN });
        insns
    }

    #[test]
    fn test_breakdown_components() {
        let a = normalized("abc", "(I)I", calls(&["abs", "max", "min", "signum", "negateExact"]));
        let stats = CorpusStats::build([&a]);
        let breakdown = score_breakdown(&a, &a, &stats);
        assert_eq!(breakdown.descriptor, 1.0);
        assert_eq!(breakdown.invoked, 1.0);
        assert_eq!(breakdown.complexity_multiplier, 1.0);
        assert_eq!(breakdown.plumbing_penalty, 1.0);
        assert!((breakdown.total - 2.7).abs() < 1e-12);
    }

    #[test]
    fn test_plumbing_penalty_applies() {
        let empty = normalized("abc", "()V", vec![Insn::Simple { op: opcodes::RETURN }]);
        let rich = normalized(
            "abd",
            "()V",
            vec![Insn::Ldc { value: Constant::String("x".into()) }, Insn::Simple { op: opcodes::RETURN }],
        );
        let stats = CorpusStats::build([&empty, &rich]);
        assert_eq!(score_breakdown(&empty, &empty, &stats).plumbing_penalty, 0.2);
        assert_eq!(score_breakdown(&empty, &rich, &stats).plumbing_penalty, 0.4);
    }

    #[test]
    fn test_prefilter() {
        let a = normalized("ab", "(Lqq;)V", vec![]);
        let b = normalized("cd", "(Lzz;)V", vec![]);
        let c = normalized("cde", "(Lzz;)V", vec![]);
        let d = normalized("ce", "(Lzzz;)V", vec![]);
        assert!(prefilter(&a, &b, ObjectCompatibility::NameLength));
        assert!(!prefilter(&a, &c, ObjectCompatibility::NameLength));
        assert!(!prefilter(&a, &d, ObjectCompatibility::NameLength));
        assert!(prefilter(&a, &d, ObjectCompatibility::Permissive));
    }

    #[test]
    fn test_class_boost() {
        assert!((class_boost(0.4, 0.5) - 0.7).abs() < 1e-12);
        assert_eq!(class_boost(0.4, 0.0), 0.4);
    }
}
