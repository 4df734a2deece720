// Class matching over fingerprints
use crate::remapper::fingerprint::ClassFingerprint;
use crate::remapper::matcher::topk::TopK;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Scored class pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMatch {
    pub old: String,
    pub new: String,
    pub score: f64,
}

/// Best `k` new classes per old class with similarity ≥ `min_similarity`.
///
/// Result is grouped by old class in input order, best first within a group.
pub fn match_classes_top_k(
    old: &[ClassFingerprint],
    new: &[ClassFingerprint],
    k: usize,
    min_similarity: f64,
) -> Vec<ClassMatch> {
    let mut matches: Vec<ClassMatch> = Vec::new();
    for old_class in old {
        let mut top: TopK<&str> = TopK::new(k);
        for new_class in new {
            let similarity = old_class.similarity(new_class);
            if similarity >= min_similarity {
                top.push(similarity, new_class.name.as_str());
            }
        }
        matches.extend(top.into_sorted_vec().into_iter().map(|(score, name)| ClassMatch {
            old: old_class.name.clone(),
            new: name.to_string(),
            score,
        }));
    }
    matches
}

/// Greedy one-to-one: take pairs in descending similarity, skipping used classes.
///
/// Ties resolve by old name, then new name.
pub fn greedy_one_to_one(
    old: &[ClassFingerprint],
    new: &[ClassFingerprint],
    min_similarity: f64,
) -> Vec<ClassMatch> {
    let mut candidates: Vec<ClassMatch> = Vec::new();
    for old_class in old {
        for new_class in new {
            let score = old_class.similarity(new_class);
            if score >= min_similarity {
                candidates.push(ClassMatch {
                    old: old_class.name.clone(),
                    new: new_class.name.clone(),
                    score,
                });
            }
        }
    }
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.old.cmp(&b.old))
            .then_with(|| a.new.cmp(&b.new))
    });

    let mut used_old: BTreeSet<String> = BTreeSet::new();
    let mut used_new: BTreeSet<String> = BTreeSet::new();
    let mut result: Vec<ClassMatch> = Vec::new();
    for candidate in candidates {
        if used_old.contains(&candidate.old) || used_new.contains(&candidate.new) {
            continue;
        }
        used_old.insert(candidate.old.clone());
        used_new.insert(candidate.new.clone());
        result.push(candidate);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remapper::bytecode::{access, Constant, Insn};
    use crate::remapper::model::{ClassRecord, MethodRecord};

    fn fingerprint(name: &str, text: &str, flags: u16) -> ClassFingerprint {
        ClassFingerprint::from_record(&ClassRecord {
            name: name.to_string(),
            super_name: None,
            interfaces: vec![],
            access: flags,
            methods: vec![MethodRecord {
                name: "a".to_string(),
                descriptor: "()V".to_string(),
                access: 0,
                instructions: vec![Insn::Ldc { value: Constant::String(text.to_string()) }],
                try_catch_blocks: vec![],
            }],
            fields: vec![],
        })
    }

    #[test]
    fn test_greedy_is_one_to_one() {
        let old = vec![fingerprint("a", "x", 0), fingerprint("b", "y", access::INTERFACE)];
        let new = vec![fingerprint("c", "y", access::INTERFACE), fingerprint("d", "x", 0)];
        let matches = greedy_one_to_one(&old, &new, 0.3);
        let pairs: Vec<(&str, &str)> = matches.iter().map(|m| (m.old.as_str(), m.new.as_str())).collect();
        assert_eq!(pairs, vec![("a", "d"), ("b", "c")]);
    }

    #[test]
    fn test_top_k_respects_threshold() {
        let old = vec![fingerprint("a", "x", 0)];
        let new = vec![fingerprint("c", "y", access::INTERFACE), fingerprint("d", "x", 0)];
        let matches = match_classes_top_k(&old, &new, 5, 0.99);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].new, "d");
    }
}
