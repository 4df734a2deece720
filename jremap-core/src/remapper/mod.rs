pub mod analysis;
pub mod bytecode;
pub mod config;
pub mod corpus;
pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod hungarian;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod opaque;
pub mod pipeline;
pub mod progress;
pub mod refine;
pub mod scoring;
pub mod similarity;
