//! Program Analysis
//!
//! Whole-snapshot analyses feeding the matchers:
//! - Call graphs over normalized methods
//! - Field reader/writer sets
//! - Reachability from framework callbacks
//! - Constant tracking over straight-line bytecode

pub mod call_graph;
pub mod field_usage;
pub mod reachability;
pub mod stack_sim;

pub use call_graph::{extract_call_graph, CallGraph};
pub use field_usage::extract_field_usage;
pub use reachability::{find_used_methods, EntryPolicy};
