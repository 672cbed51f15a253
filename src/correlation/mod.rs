//! Correlation clustering.
//!
//! A correlation is a visitor-scoped cluster of latency patterns that look
//! like the same network vantage point. New patterns either merge into an
//! existing cluster (exact signature or fuzzy similarity) or start a new one.

mod inference;
mod matcher;
mod types;

// Re-export public API
pub use inference::{LocationEstimate, LocationInferer};
pub use matcher::{ExactCheck, FuzzyMatch, SimilarityMatcher};
pub use types::{Correlation, SimilarityScore};
