//! Call-Graph Iterative Refinement
//!
//! Re-selects method matches using call-graph context until the mapping
//! stops changing.
//!
//! # States
//! `Seeded → Refining → Converged | Exhausted`
//!
//! # Algorithm
//! Each round, for every old method with candidates:
//! 1. Push its call-graph neighbors through the current mapping
//! 2. Agreement = overlap coefficient against the candidate's neighbors
//! 3. Blended = `base·(1−w) + agreement·w`
//!
//! Proposals are then assigned greedily by descending blended score, so a
//! conflict on one new method goes to the higher score and the loser falls
//! back to its next free candidate.
//!
//! A round produces a new generation only when its total agreement does not
//! drop below the previous generation's. Earlier generations are kept for
//! inspection.

use crate::remapper::analysis::call_graph::CallGraph;
use crate::remapper::error::{RemapError, RemapResult};
use crate::remapper::matcher::fields::neighborhood_agreement;
use crate::remapper::matcher::methods::MethodMatch;
use crate::remapper::model::MethodKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type MethodMapping = BTreeMap<MethodKey, MethodKey>;

/// How refinement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementOutcome {
    /// A round changed nothing, or would have lowered total agreement.
    Converged,
    /// The iteration cap was reached; the last generation is the best found.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct RefinementResult {
    /// Generation 0 is the seed.
    pub generations: Vec<MethodMapping>,
    /// Total agreement of each generation.
    pub agreement: Vec<f64>,
    /// Blended score of each entry in the final generation.
    pub scores: BTreeMap<MethodKey, f64>,
    pub outcome: RefinementOutcome,
    /// Rounds executed.
    pub iterations: usize,
}

impl RefinementResult {
    pub fn mapping(&self) -> &MethodMapping {
        // `generations` always holds at least the seed.
        &self.generations[self.generations.len() - 1]
    }

    pub fn into_mapping(mut self) -> MethodMapping {
        self.generations.pop().unwrap_or_default()
    }
}

/// Greedy one-to-one seed: best candidates first, ties by old then new key.
pub fn seed_mapping(candidates: &BTreeMap<MethodKey, Vec<MethodMatch>>, min_score: f64) -> MethodMapping {
    let mut all: Vec<&MethodMatch> = candidates
        .values()
        .flatten()
        .filter(|m| m.score >= min_score)
        .collect();
    all.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.old.cmp(&b.old))
            .then_with(|| a.new.cmp(&b.new))
    });

    let mut mapping = MethodMapping::new();
    let mut taken: BTreeSet<&MethodKey> = BTreeSet::new();
    for m in all {
        if mapping.contains_key(&m.old) || taken.contains(&m.new) {
            continue;
        }
        taken.insert(&m.new);
        mapping.insert(m.old.clone(), m.new.clone());
    }
    mapping
}

/// Refines a seed mapping against two call graphs.
pub struct CallGraphRefiner<'a> {
    old_graph: &'a CallGraph,
    new_graph: &'a CallGraph,
    neighbor_weight: f64,
    max_iterations: usize,
    include_callers: bool,
}

impl<'a> CallGraphRefiner<'a> {
    pub fn new(
        old_graph: &'a CallGraph,
        new_graph: &'a CallGraph,
        neighbor_weight: f64,
        max_iterations: usize,
    ) -> RemapResult<Self> {
        if !(0.0..=1.0).contains(&neighbor_weight) {
            return Err(RemapError::invalid_config(
                "neighbor_weight",
                neighbor_weight,
                "must be within [0, 1]",
            ));
        }
        Ok(Self {
            old_graph,
            new_graph,
            neighbor_weight,
            max_iterations,
            include_callers: false,
        })
    }

    /// Count callers as neighbors too.
    pub fn include_callers(mut self, include: bool) -> Self {
        self.include_callers = include;
        self
    }

    fn old_neighbors(&self, key: &MethodKey) -> BTreeSet<MethodKey> {
        self.old_graph.neighbors(key, self.include_callers)
    }

    fn new_neighbors(&self, key: &MethodKey) -> BTreeSet<MethodKey> {
        self.new_graph.neighbors(key, self.include_callers)
    }

    /// Agreement of `old → new` under `mapping`.
    pub fn agreement(&self, old: &MethodKey, new: &MethodKey, mapping: &MethodMapping) -> f64 {
        neighborhood_agreement(&self.old_neighbors(old), &self.new_neighbors(new), mapping)
    }

    /// Sum of agreement over every entry of `mapping`, evaluated under itself.
    pub fn total_agreement(&self, mapping: &MethodMapping) -> f64 {
        mapping.iter().map(|(old, new)| self.agreement(old, new, mapping)).sum()
    }

    #[inline]
    fn blend(&self, base: f64, agreement: f64) -> f64 {
        base * (1.0 - self.neighbor_weight) + agreement * self.neighbor_weight
    }

    /// One round: rescore every candidate under `current` and reassign.
    fn round(
        &self,
        candidates: &BTreeMap<MethodKey, Vec<MethodMatch>>,
        current: &MethodMapping,
        new_neighbors: &BTreeMap<&MethodKey, BTreeSet<MethodKey>>,
    ) -> (MethodMapping, BTreeMap<MethodKey, f64>) {
        let mut proposals: Vec<(f64, &MethodKey, &MethodKey)> = Vec::new();
        let empty = BTreeSet::new();
        for (old, list) in candidates {
            let old_neighbors = self.old_neighbors(old);
            for m in list {
                let theirs = new_neighbors.get(&m.new).unwrap_or(&empty);
                let agreement = neighborhood_agreement(&old_neighbors, theirs, current);
                proposals.push((self.blend(m.score, agreement), &m.old, &m.new));
            }
        }
        proposals.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)).then_with(|| a.2.cmp(b.2)));

        let mut mapping = MethodMapping::new();
        let mut scores: BTreeMap<MethodKey, f64> = BTreeMap::new();
        let mut taken: BTreeSet<&MethodKey> = BTreeSet::new();
        for (blended, old, new) in proposals {
            if mapping.contains_key(old) || taken.contains(new) {
                continue;
            }
            taken.insert(new);
            mapping.insert(old.clone(), new.clone());
            scores.insert(old.clone(), blended);
        }
        (mapping, scores)
    }

    /// Run refinement from `seed` until converged or out of iterations.
    pub fn refine(
        &self,
        candidates: &BTreeMap<MethodKey, Vec<MethodMatch>>,
        seed: MethodMapping,
    ) -> RefinementResult {
        let new_neighbors: BTreeMap<&MethodKey, BTreeSet<MethodKey>> = candidates
            .values()
            .flatten()
            .map(|m| (&m.new, self.new_neighbors(&m.new)))
            .collect();

        let mut scores: BTreeMap<MethodKey, f64> = BTreeMap::new();
        for (old, new) in &seed {
            let base = candidates
                .get(old)
                .and_then(|list| list.iter().find(|m| m.new == *new))
                .map_or(0.0, |m| m.score);
            scores.insert(old.clone(), base);
        }

        let mut result = RefinementResult {
            agreement: vec![self.total_agreement(&seed)],
            generations: vec![seed],
            scores,
            outcome: RefinementOutcome::Exhausted,
            iterations: 0,
        };

        while result.iterations < self.max_iterations {
            result.iterations += 1;
            let current = result.mapping();
            let (next, next_scores) = self.round(candidates, current, &new_neighbors);

            if next == *current {
                log::debug!("Refinement round {}: no changes", result.iterations);
                result.scores = next_scores;
                result.outcome = RefinementOutcome::Converged;
                break;
            }

            let total = self.total_agreement(&next);
            let previous = result.agreement[result.agreement.len() - 1];
            if total < previous {
                log::debug!(
                    "Refinement round {}: agreement would drop ({:.4} < {:.4}), keeping previous generation",
                    result.iterations,
                    total,
                    previous
                );
                result.outcome = RefinementOutcome::Converged;
                break;
            }

            let changed = next.iter().filter(|(k, v)| current.get(*k) != Some(*v)).count();
            log::debug!(
                "Refinement round {}: {} entries changed, agreement {:.4}",
                result.iterations,
                changed,
                total
            );
            result.generations.push(next);
            result.agreement.push(total);
            result.scores = next_scores;
        }

        if result.outcome == RefinementOutcome::Exhausted {
            log::warn!("Refinement exhausted after {} iterations", result.iterations);
        }
        result
    }
}

/// Refine `seed` with callee neighborhoods.
pub fn refine(
    candidates: &BTreeMap<MethodKey, Vec<MethodMatch>>,
    old_graph: &CallGraph,
    new_graph: &CallGraph,
    max_iterations: usize,
    neighbor_weight: f64,
    seed: MethodMapping,
) -> RemapResult<RefinementResult> {
    let refiner = CallGraphRefiner::new(old_graph, new_graph, neighbor_weight, max_iterations)?;
    Ok(refiner.refine(candidates, seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(owner: &str, name: &str) -> MethodKey {
        MethodKey::new(owner, name, "()V")
    }

    fn m(old: &str, new: &str, score: f64) -> MethodMatch {
        MethodMatch { old: k("o", old), new: k("n", new), score }
    }

    fn grouped(matches: Vec<MethodMatch>) -> BTreeMap<MethodKey, Vec<MethodMatch>> {
        crate::remapper::matcher::methods::group_by_old(&matches)
    }

    #[test]
    fn test_seed_is_one_to_one() {
        let candidates = grouped(vec![m("a", "x", 0.9), m("b", "x", 0.8), m("b", "y", 0.5), m("c", "z", 0.05)]);
        let seed = seed_mapping(&candidates, 0.1);
        assert_eq!(seed.len(), 2);
        assert_eq!(seed[&k("o", "a")], k("n", "x"));
        assert_eq!(seed[&k("o", "b")], k("n", "y"));
    }

    #[test]
    fn test_rejects_weight_out_of_range() {
        let graph = CallGraph::default();
        assert!(CallGraphRefiner::new(&graph, &graph, 1.5, 10).is_err());
        assert!(CallGraphRefiner::new(&graph, &graph, -0.1, 10).is_err());
    }

    #[test]
    fn test_call_context_flips_ambiguous_pair() {
        // caller a → p, caller b → q; new: x → s, y → r.
        // Seed picks a→x (slightly higher), but callees say a→y.
        let old_graph = CallGraph::from_edges([(k("o", "a"), k("o", "p")), (k("o", "b"), k("o", "q"))]);
        let new_graph = CallGraph::from_edges([(k("n", "x"), k("n", "s")), (k("n", "y"), k("n", "r"))]);
        let candidates = grouped(vec![
            m("a", "x", 0.51),
            m("a", "y", 0.50),
            m("b", "x", 0.50),
            m("b", "y", 0.51),
            m("p", "r", 0.9),
            m("q", "s", 0.9),
        ]);
        let seed = seed_mapping(&candidates, 0.1);
        assert_eq!(seed[&k("o", "a")], k("n", "x"));

        let result = refine(&candidates, &old_graph, &new_graph, 10, 0.3, seed).unwrap();
        assert_eq!(result.outcome, RefinementOutcome::Converged);
        assert_eq!(result.mapping()[&k("o", "a")], k("n", "y"));
        assert_eq!(result.mapping()[&k("o", "b")], k("n", "x"));
        assert!(result.agreement.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_zero_iterations_is_exhausted() {
        let graph = CallGraph::default();
        let candidates = grouped(vec![m("a", "x", 0.5)]);
        let seed = seed_mapping(&candidates, 0.1);
        let result = refine(&candidates, &graph, &graph, 0, 0.3, seed.clone()).unwrap();
        assert_eq!(result.outcome, RefinementOutcome::Exhausted);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.mapping(), &seed);
    }
}
