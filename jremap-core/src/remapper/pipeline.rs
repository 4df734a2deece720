//! Remapping Pipeline
//!
//! Orchestrates the matching stages for one pair of snapshots and collects
//! the results into a serializable [`RemapReport`].
//!
//! # Pipeline Stages
//! 1. **Class matching**: fingerprint both snapshots, greedy one-to-one
//! 2. **Normalization**: build `NormalizedMethod`s, skipping malformed ones
//! 3. **Corpus statistics**: IDF weights over both snapshots
//! 4. **Candidates**: parallel top-K method matching, concurrently with
//!    opaque-predicate recovery on the new snapshot
//! 5. **Seeding**: greedy one-to-one over the candidates
//! 6. **Call graphs**: one per snapshot
//! 7. **Refinement**: call-graph label propagation
//! 8. **Field usage**: reader/writer sets per field
//! 9. **Field matching**: Hungarian assignment over the refined mapping
//!
//! No stage fails on missing evidence; an empty stage yields an empty
//! mapping and later stages carry on with partial coverage.

use crate::remapper::analysis::call_graph::extract_call_graph;
use crate::remapper::analysis::field_usage::extract_field_usage;
use crate::remapper::config::MatcherConfig;
use crate::remapper::corpus::CorpusStats;
use crate::remapper::fingerprint::ClassFingerprint;
use crate::remapper::matcher::classes::{greedy_one_to_one, ClassMatch};
use crate::remapper::matcher::fields::{FieldMatch, FieldMatcher};
use crate::remapper::matcher::methods::{group_by_old, MethodMatch, MethodMatcher};
use crate::remapper::model::{FieldKey, MethodKey, Snapshot};
use crate::remapper::normalize::NormalizedMethod;
use crate::remapper::opaque::OpaqueCollector;
use crate::remapper::progress::ProgressSink;
use crate::remapper::refine::{seed_mapping, CallGraphRefiner, RefinementOutcome};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Remapping pipeline orchestrator.
pub struct RemapPipeline;

/// Counters collected while the pipeline runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub old_classes: usize,
    pub new_classes: usize,
    pub old_methods: usize,
    pub new_methods: usize,
    /// Methods dropped for malformed descriptors or reachability.
    pub skipped_methods: usize,
    pub method_candidates: usize,
    pub seeded_methods: usize,
    pub old_call_edges: usize,
    pub new_call_edges: usize,
    pub old_fields: usize,
    pub new_fields: usize,
}

/// Recovered guard constant for a method of the new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueConstant {
    pub method: MethodKey,
    pub value: i32,
}

/// Everything one run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemapReport {
    pub classes: Vec<ClassMatch>,
    pub methods: Vec<MethodMatch>,
    pub fields: Vec<FieldMatch>,
    pub outcome: RefinementOutcome,
    pub iterations: usize,
    pub stats: PipelineStats,
    pub opaque_constants: Vec<OpaqueConstant>,
    /// Old keys of mapped pairs whose content fingerprints are equal.
    pub identical_bodies: Vec<MethodKey>,
}

impl RemapReport {
    pub fn class_mapping(&self) -> BTreeMap<&str, &str> {
        self.classes.iter().map(|m| (m.old.as_str(), m.new.as_str())).collect()
    }

    pub fn method_mapping(&self) -> BTreeMap<&MethodKey, &MethodKey> {
        self.methods.iter().map(|m| (&m.old, &m.new)).collect()
    }

    pub fn field_mapping(&self) -> BTreeMap<&FieldKey, &FieldKey> {
        self.fields.iter().map(|m| (&m.old, &m.new)).collect()
    }

    /// Write the report as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report {}", path.display()))?;
        Ok(())
    }
}

impl RemapPipeline {
    /// Normalize every concrete method of `snapshot` in `reachable` (all when `None`).
    ///
    /// Returns the normalized methods and the number skipped.
    pub fn normalize(
        snapshot: &Snapshot,
        reachable: Option<&BTreeSet<MethodKey>>,
    ) -> (BTreeMap<MethodKey, NormalizedMethod>, usize) {
        let mut methods: BTreeMap<MethodKey, NormalizedMethod> = BTreeMap::new();
        let mut skipped: usize = 0;
        for (class, record) in snapshot.methods() {
            if record.is_abstract() {
                continue;
            }
            if let Some(allowed) = reachable {
                if !allowed.contains(&record.key(&class.name)) {
                    skipped += 1;
                    continue;
                }
            }
            match NormalizedMethod::from_record(&class.name, record) {
                Ok(method) => {
                    methods.insert(method.key().clone(), method);
                }
                Err(err) => {
                    log::warn!("Skipping method {}.{}: {}", class.name, record.name, err);
                    skipped += 1;
                }
            }
        }
        (methods, skipped)
    }

    /// Greedy one-to-one class matching over fingerprints.
    pub fn match_classes(old: &Snapshot, new: &Snapshot, config: &MatcherConfig) -> Vec<ClassMatch> {
        let old_prints: Vec<ClassFingerprint> = old.classes.iter().map(ClassFingerprint::from_record).collect();
        let new_prints: Vec<ClassFingerprint> = new.classes.iter().map(ClassFingerprint::from_record).collect();
        greedy_one_to_one(&old_prints, &new_prints, config.min_class_similarity)
    }

    /// Run every stage for `old` against `new`.
    ///
    /// `reachable_old`/`reachable_new` restrict which methods are visible;
    /// `None` makes every concrete method eligible.
    #[inline(never)]
    pub fn run(
        old: &Snapshot,
        new: &Snapshot,
        config: &MatcherConfig,
        reachable_old: Option<&BTreeSet<MethodKey>>,
        reachable_new: Option<&BTreeSet<MethodKey>>,
        progress: &dyn ProgressSink,
    ) -> Result<RemapReport> {
        config.validate().context("Invalid matcher configuration")?;
        log::info!("Starting remapping pipeline...");
        let mut stats = PipelineStats {
            old_classes: old.classes.len(),
            new_classes: new.classes.len(),
            ..PipelineStats::default()
        };

        // Step 1: Class matching
        log::info!("Step 1: Matching classes...");
        progress.stage("classes");
        let classes = Self::match_classes(old, new, config);
        let class_map: BTreeMap<String, String> = classes.iter().map(|m| (m.old.clone(), m.new.clone())).collect();
        log::info!("Matched {} of {} classes", classes.len(), old.classes.len());

        // Step 2: Normalization
        log::info!("Step 2: Normalizing methods...");
        progress.stage("normalize");
        let ((old_methods, old_skipped), (new_methods, new_skipped)) = rayon::join(
            || Self::normalize(old, reachable_old),
            || Self::normalize(new, reachable_new),
        );
        stats.old_methods = old_methods.len();
        stats.new_methods = new_methods.len();
        stats.skipped_methods = old_skipped + new_skipped;

        // Step 3: Corpus statistics
        log::info!("Step 3: Computing corpus statistics...");
        let corpus = CorpusStats::build(old_methods.values().chain(new_methods.values()));

        // Step 4: Candidates and opaque predicates
        log::info!("Step 4: Scoring {} x {} method pairs...", old_methods.len(), new_methods.len());
        progress.stage("methods");
        let matcher = MethodMatcher::new(&corpus, config).with_class_matches(&class_map);
        let (candidates, opaque) = rayon::join(
            || matcher.match_all(&old_methods, &new_methods, progress),
            || OpaqueCollector::from_snapshot(new, reachable_new).collect_most_frequent(),
        );
        stats.method_candidates = candidates.len();

        // Step 5: Seed
        log::info!("Step 5: Seeding method mapping...");
        let grouped = group_by_old(&candidates);
        let seed = seed_mapping(&grouped, config.min_method_score);
        stats.seeded_methods = seed.len();

        // Step 6: Call graphs
        log::info!("Step 6: Extracting call graphs...");
        let old_graph = extract_call_graph(old_methods.values(), config.restrict_call_graph);
        let new_graph = extract_call_graph(new_methods.values(), config.restrict_call_graph);
        stats.old_call_edges = old_graph.edge_count();
        stats.new_call_edges = new_graph.edge_count();

        // Step 7: Refinement
        log::info!("Step 7: Refining with call-graph context...");
        progress.stage("refine");
        let refiner = CallGraphRefiner::new(&old_graph, &new_graph, config.neighbor_weight, config.max_iterations)
            .context("Failed to configure refinement")?
            .include_callers(config.include_callers);
        let refined = refiner.refine(&grouped, seed);
        log::info!(
            "Refinement {:?} after {} iterations, {} methods mapped",
            refined.outcome,
            refined.iterations,
            refined.mapping().len()
        );

        // Step 8: Field usage
        log::info!("Step 8: Extracting field usage...");
        let old_fields = extract_field_usage(&old.classes, old_methods.values());
        let new_fields = extract_field_usage(&new.classes, new_methods.values());
        stats.old_fields = old_fields.len();
        stats.new_fields = new_fields.len();

        // Step 9: Field matching
        log::info!("Step 9: Matching fields...");
        progress.stage("fields");
        let fields = FieldMatcher::new(refined.mapping(), config)
            .with_class_matches(&class_map)
            .match_one_to_one(&old_fields, &new_fields);

        let mut methods: Vec<MethodMatch> = refined
            .mapping()
            .iter()
            .map(|(old_key, new_key)| MethodMatch {
                old: old_key.clone(),
                new: new_key.clone(),
                score: refined.scores.get(old_key).copied().unwrap_or(0.0),
            })
            .collect();
        methods.sort_by(|a, b| a.old.cmp(&b.old));

        let identical_bodies: Vec<MethodKey> = methods
            .iter()
            .filter(|m| match (old_methods.get(&m.old), new_methods.get(&m.new)) {
                (Some(o), Some(n)) => o.fingerprint() == n.fingerprint(),
                _ => false,
            })
            .map(|m| m.old.clone())
            .collect();
        log::debug!("{} of {} mapped methods have identical bodies", identical_bodies.len(), methods.len());

        let report = RemapReport {
            classes,
            methods,
            fields,
            outcome: refined.outcome,
            iterations: refined.iterations,
            stats,
            opaque_constants: opaque
                .into_iter()
                .map(|(method, value)| OpaqueConstant { method, value })
                .collect(),
            identical_bodies,
        };

        log::info!(
            "Remapping complete: {} classes, {} methods, {} fields",
            report.classes.len(),
            report.methods.len(),
            report.fields.len()
        );
        Ok(report)
    }
}
