// CLI command handlers
use crate::compression::{read_snapshot, write_json, CompressionLevel};
use crate::progress::BarProgress;
use anyhow::{Context, Result};
use jremap_core::remapper::analysis::reachability::find_used_methods;
use jremap_core::remapper::config::MatcherConfig;
use jremap_core::remapper::matcher::classes::match_classes_top_k;
use jremap_core::remapper::fingerprint::ClassFingerprint;
use jremap_core::remapper::model::{MethodKey, Snapshot};
use jremap_core::remapper::opaque::OpaqueCollector;
use jremap_core::remapper::pipeline::{OpaqueConstant, RemapPipeline};
use std::collections::BTreeSet;
use std::path::Path;

fn load_config(path: Option<&Path>) -> Result<MatcherConfig> {
    match path {
        Some(path) => MatcherConfig::load(path),
        None => Ok(MatcherConfig::default()),
    }
}

fn reachable(snapshot: &Snapshot, config: &MatcherConfig) -> BTreeSet<MethodKey> {
    find_used_methods(&snapshot.classes, &config.reachability)
}

pub fn remap(
    old_path: &Path,
    new_path: &Path,
    config_path: Option<&Path>,
    output: &Path,
    use_reachability: bool,
    level: CompressionLevel,
) -> Result<()> {
    let config = load_config(config_path)?;
    let old = read_snapshot(old_path).context("Failed to load old snapshot")?;
    let new = read_snapshot(new_path).context("Failed to load new snapshot")?;

    let (reachable_old, reachable_new) = if use_reachability {
        (Some(reachable(&old, &config)), Some(reachable(&new, &config)))
    } else {
        (None, None)
    };

    let progress = BarProgress::new("Remapping...");
    let report = RemapPipeline::run(
        &old,
        &new,
        &config,
        reachable_old.as_ref(),
        reachable_new.as_ref(),
        &progress,
    )?;
    progress.finish("Remapping complete");

    write_json(output, &report, level)
        .with_context(|| format!("Failed to write report: {}", output.display()))?;

    println!("Classes mapped: {}", report.classes.len());
    println!("Methods mapped: {}", report.methods.len());
    println!("Fields mapped:  {}", report.fields.len());
    println!("Refinement:     {:?} after {} iterations", report.outcome, report.iterations);
    println!("Report written to: {}", output.display());
    Ok(())
}

pub fn classes(
    old_path: &Path,
    new_path: &Path,
    config_path: Option<&Path>,
    output: Option<&Path>,
    level: CompressionLevel,
) -> Result<()> {
    let config = load_config(config_path)?;
    let old = read_snapshot(old_path).context("Failed to load old snapshot")?;
    let new = read_snapshot(new_path).context("Failed to load new snapshot")?;

    let old_prints: Vec<ClassFingerprint> = old.classes.iter().map(ClassFingerprint::from_record).collect();
    let new_prints: Vec<ClassFingerprint> = new.classes.iter().map(ClassFingerprint::from_record).collect();
    let matches = match_classes_top_k(&old_prints, &new_prints, config.class_top_k, config.min_class_similarity);

    match output {
        Some(path) => {
            write_json(path, &matches, level)?;
            println!("{} class candidates written to: {}", matches.len(), path.display());
        }
        None => {
            for m in &matches {
                println!("{} -> {} ({:.4})", m.old, m.new, m.score);
            }
        }
    }
    Ok(())
}

pub fn opaque(snapshot_path: &Path, config_path: Option<&Path>, use_reachability: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let snapshot = read_snapshot(snapshot_path)?;
    let visible = use_reachability.then(|| reachable(&snapshot, &config));

    let constants: Vec<OpaqueConstant> = OpaqueCollector::from_snapshot(&snapshot, visible.as_ref())
        .collect_most_frequent()
        .into_iter()
        .map(|(method, value)| OpaqueConstant { method, value })
        .collect();

    for c in &constants {
        println!("{} = {}", c.method, c.value);
    }
    println!("Recovered {} constants", constants.len());
    Ok(())
}

pub fn write_default_config(output: &Path) -> Result<()> {
    MatcherConfig::default().save(output)?;
    println!("Default configuration written to: {}", output.display());
    Ok(())
}
