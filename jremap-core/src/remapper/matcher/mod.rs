//! Candidate Selection
//!
//! Top-K and one-to-one matchers for classes, methods and fields.

pub mod classes;
pub mod fields;
pub mod methods;
pub mod topk;

pub use classes::{greedy_one_to_one, match_classes_top_k, ClassMatch};
pub use fields::{FieldMatch, FieldMatcher};
pub use methods::{MethodMatch, MethodMatcher};
pub use topk::TopK;
