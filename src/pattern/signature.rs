//! Canonical pattern signatures.
//!
//! A signature is the SHA-256 of the canonical pattern string, hex encoded.
//! Two patterns with the same ASN ids and the same normalized times (to four
//! decimals) share a signature. Real-world jitter changes the fourth decimal
//! often, so signatures only serve the exact-match fast path; clustering
//! relies on similarity scoring.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::Pattern;
use crate::config::SIGNATURE_DECIMALS;

/// Fixed-length (64 hex chars) signature of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternSignature(String);

impl PatternSignature {
    /// Computes the signature of a pattern.
    pub fn of(pattern: &Pattern) -> Self {
        Self::of_canonical(&canonical_string(pattern))
    }

    pub(crate) fn of_canonical(canonical: &str) -> Self {
        PatternSignature(format!("{:x}", Sha256::digest(canonical.as_bytes())))
    }

    /// Wraps a signature read back from storage.
    pub fn from_stored(value: String) -> Self {
        PatternSignature(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatternSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical serialization: `"{asn_id}:{normalized_time:.4};"` per entry.
///
/// Entries are ordered by their rounded time and then ASN id. Times that only
/// differ past the fourth decimal would otherwise keep their exact-time order
/// and split one signature in two.
pub fn canonical_string(pattern: &Pattern) -> String {
    let mut rounded: Vec<(String, u32)> = pattern
        .entries()
        .iter()
        .map(|entry| {
            (
                format!("{:.*}", SIGNATURE_DECIMALS, entry.normalized_time),
                entry.asn_id,
            )
        })
        .collect();
    rounded.sort_by(|(a_time, a_asn), (b_time, b_asn)| {
        rounded_value(a_time)
            .total_cmp(&rounded_value(b_time))
            .then_with(|| a_asn.cmp(b_asn))
    });

    let mut canonical = String::with_capacity(rounded.len() * 16);
    for (time, asn_id) in &rounded {
        canonical.push_str(&format!("{asn_id}:{time};"));
    }
    canonical
}

fn rounded_value(formatted: &str) -> f64 {
    formatted.parse().unwrap_or(f64::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::builder::test_support::probe;
    use crate::pattern::build_pattern;

    #[test]
    fn test_canonical_string_format() {
        let pattern = build_pattern(&[probe(1, 10.0, None), probe(2, 25.0, None)]);
        assert_eq!(canonical_string(&pattern), "1:1.0000;2:2.5000;");
    }

    #[test]
    fn test_signature_is_fixed_length_hex() {
        let pattern = build_pattern(&[probe(1, 10.0, None), probe(2, 25.0, None)]);
        let signature = PatternSignature::of(&pattern);
        assert_eq!(signature.as_str().len(), 64);
        assert!(signature
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_signature_independent_of_input_order() {
        let a = vec![
            probe(100, 12.0, None),
            probe(200, 30.0, None),
            probe(300, 18.5, None),
        ];
        let mut b = a.clone();
        b.rotate_left(1);
        assert_eq!(
            PatternSignature::of(&build_pattern(&a)),
            PatternSignature::of(&build_pattern(&b))
        );
    }

    #[test]
    fn test_signature_ignores_differences_below_four_decimals() {
        // 2.00001 and 2.00002 both canonicalize to 2.0000
        let a = build_pattern(&[probe(1, 100_000.0, None), probe(2, 200_001.0, None)]);
        let b = build_pattern(&[probe(1, 100_000.0, None), probe(2, 200_002.0, None)]);
        assert_eq!(canonical_string(&a), canonical_string(&b));
        assert_eq!(PatternSignature::of(&a), PatternSignature::of(&b));
    }

    #[test]
    fn test_signature_orders_rounded_ties_by_asn() {
        // ASN 2 lands before or after ASN 3 depending on the fifth decimal
        let a = build_pattern(&[
            probe(1, 10.0, None),
            probe(2, 20.0001, None),
            probe(3, 20.0002, None),
        ]);
        let b = build_pattern(&[
            probe(1, 10.0, None),
            probe(2, 20.0003, None),
            probe(3, 20.0002, None),
        ]);
        assert_eq!(canonical_string(&a), "1:1.0000;2:2.0000;3:2.0000;");
        assert_eq!(canonical_string(&a), canonical_string(&b));
        assert_eq!(PatternSignature::of(&a), PatternSignature::of(&b));
    }

    #[test]
    fn test_signature_changes_on_timing_shift() {
        let a = build_pattern(&[probe(1, 10.0, None), probe(2, 20.0, None)]);
        // 2.0 -> 2.0002
        let b = build_pattern(&[probe(1, 10.0, None), probe(2, 20.002, None)]);
        assert_ne!(PatternSignature::of(&a), PatternSignature::of(&b));
    }

    #[test]
    fn test_signature_changes_on_asn_change() {
        let a = build_pattern(&[probe(1, 10.0, None), probe(2, 20.0, None)]);
        let b = build_pattern(&[probe(1, 10.0, None), probe(3, 20.0, None)]);
        assert_ne!(PatternSignature::of(&a), PatternSignature::of(&b));
    }

    #[test]
    fn test_empty_pattern_signature_is_stable() {
        let empty = Pattern::empty();
        assert_eq!(canonical_string(&empty), "");
        assert_eq!(
            PatternSignature::of(&empty).as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
