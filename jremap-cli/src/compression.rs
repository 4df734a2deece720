//! Compression Support
//!
//! Snapshots and reports may be stored zstd-compressed. The format is chosen
//! by file extension: `.zst` is zstd, anything else is plain JSON.

use anyhow::{Context, Result};
use jremap_core::remapper::model::Snapshot;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// Zstd compression
    Zstd,
    /// No compression
    None,
}

impl CompressionAlgorithm {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("zst") | Some("zstd") => CompressionAlgorithm::Zstd,
            _ => CompressionAlgorithm::None,
        }
    }
}

/// Compression level, clamped to zstd's 1-22 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(i32);

impl CompressionLevel {
    pub fn new(level: i32) -> Self {
        Self(level.clamp(1, 22))
    }

    pub fn get(self) -> i32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(3)
    }
}

/// Open `path` for reading, decompressing on the fly when needed.
pub fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader: Box<dyn Read> = match CompressionAlgorithm::from_path(path) {
        CompressionAlgorithm::Zstd => Box::new(
            zstd::stream::read::Decoder::new(file)
                .with_context(|| format!("Failed to start zstd decoder for {}", path.display()))?,
        ),
        CompressionAlgorithm::None => Box::new(BufReader::new(file)),
    };
    Ok(reader)
}

/// Load a snapshot from plain or zstd-compressed JSON.
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let reader = open_reader(path)?;
    let snapshot = Snapshot::from_reader(reader).with_context(|| format!("Failed to decode snapshot {}", path.display()))?;
    log::info!("Loaded {} classes from {}", snapshot.classes.len(), path.display());
    Ok(snapshot)
}

/// Write `value` as pretty JSON, compressed when the extension asks for it.
pub fn write_json<T: Serialize>(path: &Path, value: &T, level: CompressionLevel) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    match CompressionAlgorithm::from_path(path) {
        CompressionAlgorithm::Zstd => {
            let mut encoder = zstd::stream::write::Encoder::new(file, level.get())?;
            serde_json::to_writer_pretty(&mut encoder, value)?;
            encoder.finish()?.flush()?;
        }
        CompressionAlgorithm::None => {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
    }
    Ok(())
}
