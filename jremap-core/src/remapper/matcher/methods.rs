//! Method Candidate Matching
//!
//! Top-K candidate selection for every old method against every new method.
//!
//! # Algorithm
//! One task per old method scans all new methods, applies the structural
//! pre-filter, scores surviving pairs, applies the class-owner boost and
//! keeps the best `top_k` above `min_method_score` in a bounded heap.
//!
//! # Concurrency
//! Tasks run on a dedicated rayon pool. Each task owns its heap; the only
//! shared state is the processed-pair counter and a lock-free result queue.
//! A panicking task is logged and contributes no candidates.

use crate::remapper::config::MatcherConfig;
use crate::remapper::corpus::CorpusStats;
use crate::remapper::matcher::topk::TopK;
use crate::remapper::model::MethodKey;
use crate::remapper::normalize::NormalizedMethod;
use crate::remapper::progress::{PairCounter, ProgressSink};
use crate::remapper::scoring::{class_boost, prefilter, score};
use crossbeam::queue::SegQueue;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

/// Scored candidate pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodMatch {
    pub old: MethodKey,
    pub new: MethodKey,
    pub score: f64,
}

/// Descending score, then old key, then new key.
pub fn sort_matches(matches: &mut [MethodMatch]) {
    matches.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.old.cmp(&b.old))
            .then_with(|| a.new.cmp(&b.new))
    });
}

/// Group candidates by old key, each list best first.
pub fn group_by_old(matches: &[MethodMatch]) -> BTreeMap<MethodKey, Vec<MethodMatch>> {
    let mut grouped: BTreeMap<MethodKey, Vec<MethodMatch>> = BTreeMap::new();
    for m in matches {
        grouped.entry(m.old.clone()).or_default().push(m.clone());
    }
    for list in grouped.values_mut() {
        sort_matches(list);
    }
    grouped
}

/// Top-K method matcher over a fixed corpus.
pub struct MethodMatcher<'a> {
    stats: &'a CorpusStats,
    config: &'a MatcherConfig,
    /// Old class name → matched new class name.
    class_matches: Option<&'a BTreeMap<String, String>>,
}

impl<'a> MethodMatcher<'a> {
    pub fn new(stats: &'a CorpusStats, config: &'a MatcherConfig) -> Self {
        Self {
            stats,
            config,
            class_matches: None,
        }
    }

    /// Enable the class-owner boost.
    pub fn with_class_matches(mut self, class_matches: &'a BTreeMap<String, String>) -> Self {
        self.class_matches = Some(class_matches);
        self
    }

    /// Pair score after pre-filter and class boost, `None` when rejected.
    pub fn pair_score(&self, old: &NormalizedMethod, new: &NormalizedMethod) -> Option<f64> {
        if !prefilter(old, new, self.config.object_compatibility) {
            return None;
        }
        let mut s = score(old, new, self.stats);
        let owner_matched = self
            .class_matches
            .and_then(|classes| classes.get(&old.key().owner))
            .map_or(false, |matched| *matched == new.key().owner);
        if owner_matched {
            s = class_boost(s, self.config.class_weight);
        }
        Some(s)
    }

    /// Best candidates for one old method, best first.
    pub fn candidates_for(&self, old: &NormalizedMethod, new: &[&NormalizedMethod]) -> Vec<MethodMatch> {
        #[cfg(test)]
        if old.key().name == tests::FAILING_METHOD {
            panic!("injected scan failure for {}", old.key());
        }
        let mut top: TopK<usize> = TopK::new(self.config.top_k);
        for (index, candidate) in new.iter().enumerate() {
            match self.pair_score(old, candidate) {
                Some(s) if s >= self.config.min_method_score => top.push(s, index),
                _ => {}
            }
        }
        top.into_sorted_vec()
            .into_iter()
            .map(|(s, index)| MethodMatch {
                old: old.key().clone(),
                new: new[index].key().clone(),
                score: s,
            })
            .collect()
    }

    /// Top-K candidates for every old method, sorted by descending score.
    ///
    /// `new` is iterated in key order, so heap ties resolve toward the
    /// smaller new key.
    pub fn match_all(
        &self,
        old: &BTreeMap<MethodKey, NormalizedMethod>,
        new: &BTreeMap<MethodKey, NormalizedMethod>,
        progress: &dyn ProgressSink,
    ) -> Vec<MethodMatch> {
        if old.is_empty() || new.is_empty() {
            return Vec::new();
        }

        let olds: Vec<&NormalizedMethod> = old.values().collect();
        let news: Vec<&NormalizedMethod> = new.values().collect();
        let counter = PairCounter::new(olds.len() as u64 * news.len() as u64);
        let results: SegQueue<Vec<MethodMatch>> = SegQueue::new();

        let scan = || {
            olds.par_iter().for_each(|method| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.candidates_for(method, &news)));
                match outcome {
                    Ok(found) if !found.is_empty() => results.push(found),
                    Ok(_) => {}
                    Err(_) => log::warn!("Candidate scan failed for {}; treating as no candidates", method.key()),
                }
                counter.advance(news.len() as u64, progress);
            })
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers())
            .build()
        {
            Ok(pool) => pool.install(scan),
            Err(err) => {
                log::warn!("Failed to build matcher pool ({}); using the global pool", err);
                scan()
            }
        }

        let mut matches: Vec<MethodMatch> = Vec::with_capacity(results.len() * self.config.top_k.min(8));
        while let Some(batch) = results.pop() {
            matches.extend(batch);
        }
        sort_matches(&mut matches);

        log::debug!(
            "Scored {} of {} pairs, {} candidates kept",
            counter.done(),
            counter.total(),
            matches.len()
        );
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remapper::bytecode::{opcodes, Constant, Insn};
    use crate::remapper::model::MethodRecord;

    /// Old methods with this name panic inside the candidate scan.
    pub(super) const FAILING_METHOD: &str = "scan_panics";

    fn normalized(owner: &str, name: &str) -> NormalizedMethod {
        let record = MethodRecord {
            name: name.to_string(),
            descriptor: "()V".to_string(),
            access: 0,
            instructions: vec![
                Insn::Ldc { value: Constant::String("payload".to_string()) },
                Insn::Method {
                    op: opcodes::INVOKESTATIC,
                    owner: "java/lang/String".to_string(),
                    name: "valueOf".to_string(),
                    desc: "(Ljava/lang/Object;)Ljava/lang/String;".to_string(),
                },
                Insn::Simple { op: opcodes::RETURN },
            ],
            try_catch_blocks: vec![],
        };
        NormalizedMethod::from_record(owner, &record).unwrap()
    }

    fn keyed(methods: Vec<NormalizedMethod>) -> BTreeMap<MethodKey, NormalizedMethod> {
        methods.into_iter().map(|m| (m.key().clone(), m)).collect()
    }

    #[test]
    fn test_panicking_task_yields_no_candidates() {
        let old = keyed(vec![normalized("aa", FAILING_METHOD), normalized("aa", "b"), normalized("aa", "c")]);
        let new = keyed(vec![normalized("zz", "x")]);
        let stats = CorpusStats::build(old.values().chain(new.values()));
        let config = MatcherConfig { worker_threads: 2, ..MatcherConfig::default() };

        let matches = MethodMatcher::new(&stats, &config).match_all(&old, &new, &crate::remapper::progress::NoProgress);

        let sources: Vec<&str> = matches.iter().map(|m| m.old.name.as_str()).collect();
        assert_eq!(sources, vec!["b", "c"]);
        assert!(matches.iter().all(|m| m.new == MethodKey::new("zz", "x", "()V")));
    }

    #[test]
    fn test_group_by_old_sorts_each_list() {
        let key = |owner: &str, name: &str| MethodKey::new(owner, name, "()V");
        let matches = vec![
            MethodMatch { old: key("a", "m"), new: key("b", "x"), score: 0.2 },
            MethodMatch { old: key("a", "m"), new: key("b", "y"), score: 0.9 },
            MethodMatch { old: key("a", "n"), new: key("b", "x"), score: 0.5 },
        ];
        let grouped = group_by_old(&matches);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&key("a", "m")][0].new, key("b", "y"));
    }
}
