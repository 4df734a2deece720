//! Field Matching
//!
//! Scores old/new field pairs from type, modifiers and read/write
//! neighborhoods pushed through an already refined method mapping.
//!
//! # Algorithm
//! `score = 0.5·[type equal] + 0.1·modifier_agreement
//!        + neighbor_weight·(agree(readers) + agree(writers)) / 2`
//!
//! One-to-one mode builds the dense score matrix, blends in class alignment,
//! zeroes sub-threshold entries, pads to square and runs the Hungarian solver.

use crate::remapper::config::MatcherConfig;
use crate::remapper::hungarian;
use crate::remapper::matcher::topk::TopK;
use crate::remapper::model::{FieldKey, MethodKey};
use crate::remapper::normalize::NormalizedField;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const TYPE_WEIGHT: f64 = 0.5;
pub const MODIFIER_WEIGHT: f64 = 0.1;

/// Scored field pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub old: FieldKey,
    pub new: FieldKey,
    pub score: f64,
}

/// Per-component view of a field pair score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldScoreBreakdown {
    pub type_match: f64,
    pub modifiers: f64,
    pub readers: f64,
    pub writers: f64,
    /// Mean of reader and writer agreement.
    pub neighborhood: f64,
    pub total: f64,
}

/// Agreement of two method neighborhoods under `mapping`.
///
/// Both empty is neutral (1.0); exactly one empty, or nothing mapped, is 0.0.
/// Otherwise the overlap coefficient of the mapped old set and the new set.
pub fn neighborhood_agreement(
    old: &BTreeSet<MethodKey>,
    new: &BTreeSet<MethodKey>,
    mapping: &BTreeMap<MethodKey, MethodKey>,
) -> f64 {
    match (old.is_empty(), new.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }
    let mapped: BTreeSet<&MethodKey> = old.iter().filter_map(|k| mapping.get(k)).collect();
    if mapped.is_empty() {
        return 0.0;
    }
    let shared = mapped.iter().filter(|k| new.contains(**k)).count();
    shared as f64 / mapped.len().min(new.len()) as f64
}

pub fn field_score_breakdown(
    old: &NormalizedField,
    new: &NormalizedField,
    mapping: &BTreeMap<MethodKey, MethodKey>,
    neighbor_weight: f64,
) -> FieldScoreBreakdown {
    let type_match = if old.field_type.normalized() == new.field_type.normalized() { 1.0 } else { 0.0 };
    let static_agree = if old.is_static == new.is_static { 0.5 } else { 0.0 };
    let final_agree = if old.is_final == new.is_final { 0.5 } else { 0.0 };
    let modifiers = (static_agree + final_agree) / 2.0;
    let readers = neighborhood_agreement(&old.readers, &new.readers, mapping);
    let writers = neighborhood_agreement(&old.writers, &new.writers, mapping);
    let neighborhood = (readers + writers) / 2.0;

    FieldScoreBreakdown {
        type_match,
        modifiers,
        readers,
        writers,
        neighborhood,
        total: type_match * TYPE_WEIGHT + modifiers * MODIFIER_WEIGHT + neighborhood * neighbor_weight,
    }
}

#[inline]
pub fn field_score(
    old: &NormalizedField,
    new: &NormalizedField,
    mapping: &BTreeMap<MethodKey, MethodKey>,
    neighbor_weight: f64,
) -> f64 {
    field_score_breakdown(old, new, mapping, neighbor_weight).total
}

/// Field matcher layered over a method mapping.
pub struct FieldMatcher<'a> {
    method_mapping: &'a BTreeMap<MethodKey, MethodKey>,
    config: &'a MatcherConfig,
    class_matches: Option<&'a BTreeMap<String, String>>,
}

impl<'a> FieldMatcher<'a> {
    pub fn new(method_mapping: &'a BTreeMap<MethodKey, MethodKey>, config: &'a MatcherConfig) -> Self {
        Self {
            method_mapping,
            config,
            class_matches: None,
        }
    }

    /// Blend class alignment into one-to-one scores.
    pub fn with_class_matches(mut self, class_matches: &'a BTreeMap<String, String>) -> Self {
        self.class_matches = Some(class_matches);
        self
    }

    #[inline]
    fn score(&self, old: &NormalizedField, new: &NormalizedField) -> f64 {
        field_score(old, new, self.method_mapping, self.config.field_neighbor_weight)
    }

    fn class_alignment(&self, old: &NormalizedField, new: &NormalizedField) -> Option<f64> {
        let classes = self.class_matches?;
        let aligned = classes.get(&old.key.owner).map_or(false, |m| *m == new.key.owner);
        Some(if aligned { 1.0 } else { 0.0 })
    }

    /// Best `top_k` candidates per old field above `min_field_score`.
    pub fn match_top_k(
        &self,
        old: &BTreeMap<FieldKey, NormalizedField>,
        new: &BTreeMap<FieldKey, NormalizedField>,
    ) -> Vec<FieldMatch> {
        let news: Vec<&NormalizedField> = new.values().collect();
        let mut matches: Vec<FieldMatch> = Vec::new();

        for old_field in old.values() {
            let mut top: TopK<usize> = TopK::new(self.config.top_k);
            for (index, candidate) in news.iter().enumerate() {
                let s = self.score(old_field, candidate);
                if s >= self.config.min_field_score {
                    top.push(s, index);
                }
            }
            matches.extend(top.into_sorted_vec().into_iter().map(|(s, index)| FieldMatch {
                old: old_field.key.clone(),
                new: news[index].key.clone(),
                score: s,
            }));
        }
        matches
    }

    /// Globally optimal one-to-one assignment; pairs under `min_field_score` are dropped.
    pub fn match_one_to_one(
        &self,
        old: &BTreeMap<FieldKey, NormalizedField>,
        new: &BTreeMap<FieldKey, NormalizedField>,
    ) -> Vec<FieldMatch> {
        if old.is_empty() || new.is_empty() {
            return Vec::new();
        }
        let olds: Vec<&NormalizedField> = old.values().collect();
        let news: Vec<&NormalizedField> = new.values().collect();
        let threshold = self.config.min_field_score;
        let class_weight = self.config.class_owner_weight;

        let weights: Vec<Vec<f64>> = olds
            .iter()
            .map(|o| {
                news.iter()
                    .map(|n| {
                        let base = self.score(o, n);
                        let blended = match self.class_alignment(o, n) {
                            Some(align) => base * (1.0 - class_weight) + align * class_weight,
                            None => base,
                        };
                        if blended < threshold {
                            0.0
                        } else {
                            blended
                        }
                    })
                    .collect()
            })
            .collect();

        let padded = hungarian::pad_square(weights, news.len());
        let assignment = hungarian::maximize(&padded);

        let mut matches: Vec<FieldMatch> = Vec::new();
        for (i, column) in assignment.into_iter().enumerate().take(olds.len()) {
            let Some(j) = column else { continue };
            if j >= news.len() {
                continue;
            }
            let weight = padded[i][j];
            if weight > 0.0 && weight >= threshold {
                matches.push(FieldMatch {
                    old: olds[i].key.clone(),
                    new: news[j].key.clone(),
                    score: weight,
                });
            }
        }
        log::debug!("Field assignment kept {} of {} old fields", matches.len(), olds.len());
        matches
    }
}
