//! Set Similarity Measures
//!
//! Jaccard variants, overlap coefficient and histogram cosine shared by the
//! method, field and class scorers. All measures are symmetric and return
//! values in `[0, 1]`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// IDF-weighted Jaccard. Tokens missing from `idf` weigh 1.0.
///
/// Two empty sets are identical (1.0).
pub fn weighted_jaccard(idf: &HashMap<String, f64>, a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let weight = |token: &String| idf.get(token).copied().unwrap_or(1.0);

    let numerator: f64 = a.intersection(b).map(weight).sum();
    let denominator: f64 = a.union(b).map(weight).sum();
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Plain Jaccard; two empty sets score 1.0.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// `|A ∩ B| / min(|A|, |B|)`; 0.0 when either side is empty.
pub fn overlap_coefficient<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / a.len().min(b.len()) as f64
}

/// Overlap coefficient over map key sets.
pub fn key_overlap<K: Ord, V, W>(a: &BTreeMap<K, V>, b: &BTreeMap<K, W>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.keys().filter(|k| b.contains_key(k)).count();
    intersection as f64 / a.len().min(b.len()) as f64
}

/// `Σ min / Σ max` over a multiset; two empty multisets score 1.0.
pub fn multiset_jaccard<K: Ord>(a: &BTreeMap<K, u32>, b: &BTreeMap<K, u32>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let mut min_sum: u64 = 0;
    let mut max_sum: u64 = 0;
    for (key, &va) in a {
        let vb = b.get(key).copied().unwrap_or(0);
        min_sum += va.min(vb) as u64;
        max_sum += va.max(vb) as u64;
    }
    for (key, &vb) in b {
        if !a.contains_key(key) {
            max_sum += vb as u64;
        }
    }
    if max_sum == 0 {
        0.0
    } else {
        min_sum as f64 / max_sum as f64
    }
}

/// Cosine similarity of two count histograms; two empty histograms score 1.0.
pub fn cosine<K: Ord>(a: &BTreeMap<K, u32>, b: &BTreeMap<K, u32>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let dot: f64 = a
        .iter()
        .map(|(k, &va)| va as f64 * b.get(k).copied().unwrap_or(0) as f64)
        .sum();
    let norm = |h: &BTreeMap<K, u32>| h.values().map(|&v| (v as f64) * (v as f64)).sum::<f64>().sqrt();
    let (norm_a, norm_b) = (norm(a), norm(b));
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_weighted_jaccard_boundaries() {
        let idf: HashMap<String, f64> = HashMap::new();
        assert_eq!(weighted_jaccard(&idf, &set(&[]), &set(&[])), 1.0);
        assert_eq!(weighted_jaccard(&idf, &set(&["a"]), &set(&[])), 0.0);
        assert_eq!(weighted_jaccard(&idf, &set(&[]), &set(&["a"])), 0.0);
    }

    #[test]
    fn test_weighted_jaccard_uses_idf() {
        let mut idf: HashMap<String, f64> = HashMap::new();
        idf.insert("rare".to_string(), 3.0);
        idf.insert("common".to_string(), 1.0);
        let sim = weighted_jaccard(&idf, &set(&["rare", "common"]), &set(&["rare"]));
        assert!((sim - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_overlap_and_jaccard() {
        assert_eq!(overlap_coefficient(&set(&["a"]), &set(&["b"])), 0.0);
        assert_eq!(overlap_coefficient(&set(&["a"]), &set(&["a", "b", "c"])), 1.0);
        assert_eq!(overlap_coefficient(&set(&[]), &set(&[])), 0.0);
        assert!((jaccard(&set(&["a", "b"]), &set(&["b", "c"])) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(jaccard::<String>(&BTreeSet::new(), &BTreeSet::new()), 1.0);
    }

    #[test]
    fn test_multiset_and_cosine() {
        let a: BTreeMap<&str, u32> = [("x", 2), ("y", 1)].into_iter().collect();
        let b: BTreeMap<&str, u32> = [("x", 1), ("z", 1)].into_iter().collect();
        assert!((multiset_jaccard(&a, &b) - 0.25).abs() < 1e-12);
        assert!((cosine(&a, &a) - 1.0).abs() < 1e-12);
        let c: BTreeMap<&str, u32> = [("q", 4)].into_iter().collect();
        assert_eq!(cosine(&a, &c), 0.0);
    }
}
