// Matcher configuration
use crate::remapper::analysis::reachability::EntryPolicy;
use crate::remapper::descriptor::ObjectCompatibility;
use crate::remapper::error::{RemapError, RemapResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunable knobs for one remapping run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Candidates kept per old method.
    pub top_k: usize,
    pub min_method_score: f64,
    pub min_field_score: f64,
    /// Weight of call-graph agreement during refinement, in `[0, 1]`.
    pub neighbor_weight: f64,
    /// Weight of reader/writer agreement when scoring fields.
    pub field_neighbor_weight: f64,
    /// Boost toward methods whose owner matches the old owner's class match.
    pub class_weight: f64,
    /// Class alignment blend used by field one-to-one assignment.
    pub class_owner_weight: f64,
    pub class_top_k: usize,
    pub min_class_similarity: f64,
    pub max_iterations: usize,
    /// Worker threads for candidate scoring; 0 uses available parallelism.
    pub worker_threads: usize,
    pub object_compatibility: ObjectCompatibility,
    /// Add callers to callees when computing refinement neighborhoods.
    pub include_callers: bool,
    /// Only keep call edges whose target is a method of the same snapshot.
    pub restrict_call_graph: bool,
    pub reachability: EntryPolicy,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            top_k: 50,
            min_method_score: 0.1,
            min_field_score: 0.25,
            neighbor_weight: 0.3,
            field_neighbor_weight: 0.4,
            class_weight: 0.5,
            class_owner_weight: 0.2,
            class_top_k: 1,
            min_class_similarity: 0.3,
            max_iterations: 10,
            worker_threads: 0,
            object_compatibility: ObjectCompatibility::NameLength,
            include_callers: false,
            restrict_call_graph: true,
            reachability: EntryPolicy::default(),
        }
    }
}

impl MatcherConfig {
    /// Reject values outside their valid ranges.
    pub fn validate(&self) -> RemapResult<()> {
        let unit_weights: [(&'static str, f64); 4] = [
            ("neighbor_weight", self.neighbor_weight),
            ("field_neighbor_weight", self.field_neighbor_weight),
            ("class_weight", self.class_weight),
            ("class_owner_weight", self.class_owner_weight),
        ];
        for (field, value) in unit_weights {
            if !(0.0..=1.0).contains(&value) {
                return Err(RemapError::invalid_config(field, value, "must be within [0, 1]"));
            }
        }
        let thresholds: [(&'static str, f64); 3] = [
            ("min_method_score", self.min_method_score),
            ("min_field_score", self.min_field_score),
            ("min_class_similarity", self.min_class_similarity),
        ];
        for (field, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(RemapError::invalid_config(field, value, "must be a non-negative number"));
            }
        }
        if self.top_k == 0 {
            return Err(RemapError::invalid_config("top_k", self.top_k, "must be at least 1"));
        }
        if self.class_top_k == 0 {
            return Err(RemapError::invalid_config("class_top_k", self.class_top_k, "must be at least 1"));
        }
        Ok(())
    }

    /// Effective worker count.
    pub fn workers(&self) -> usize {
        if self.worker_threads > 0 {
            self.worker_threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: MatcherConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        config.validate().context("Config file rejected")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }
}
