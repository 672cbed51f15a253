//! Latency fingerprint patterns.
//!
//! This module turns a batch of probe results into a normalized [`Pattern`]
//! and derives its canonical [`PatternSignature`] for exact-match lookup.

mod builder;
mod signature;
mod types;

// Re-export public API
pub use builder::build_pattern;
pub use signature::{canonical_string, PatternSignature};
pub use types::{Pattern, PatternEntry};

#[cfg(test)]
pub(crate) use builder::test_support;
