//! jremap core library
//!
//! Structural matching engine that recovers class, method and field
//! correspondences between two obfuscated builds of the same JVM program.

pub mod remapper;

pub use remapper::config::MatcherConfig;
pub use remapper::error::RemapError;
pub use remapper::model::{ClassKey, ElementKey, FieldKey, MethodKey, Snapshot};
pub use remapper::pipeline::{RemapPipeline, RemapReport};
