//! Fuzzy matching of a pattern against a visitor's clusters.
//!
//! Matching is two-stage: an exact signature hit (verified against the stored
//! snapshot's canonical string) and otherwise a most-recent-first scan that
//! accepts the first cluster strictly above the similarity threshold.
//! No global best-match search is made: a recent cluster wins over an older,
//! slightly better one.

use std::collections::BTreeSet;

use super::types::{Correlation, SimilarityScore};
use crate::config::EngineSettings;
use crate::error_handling::SnapshotError;
use crate::pattern::{canonical_string, Pattern};

/// Outcome of verifying an exact-signature hit.
#[derive(Debug)]
pub enum ExactCheck {
    /// The stored snapshot canonicalizes to the same string as the new pattern
    Verified,
    /// Same signature, different canonical string
    Collision,
    /// The stored snapshot could not be parsed
    InvalidSnapshot(SnapshotError),
}

/// Result of a fuzzy scan over a visitor's clusters.
#[derive(Debug)]
pub struct FuzzyMatch<'a> {
    /// The accepted cluster and its score, if any
    pub best: Option<(&'a Correlation, SimilarityScore)>,
    /// Clusters skipped because their snapshot was unusable
    pub skipped: Vec<(&'a Correlation, SnapshotError)>,
}

/// Scores pattern pairs and picks the cluster a new pattern belongs to.
#[derive(Debug, Clone)]
pub struct SimilarityMatcher {
    asn_weight: f64,
    deviation_weight: f64,
    threshold: f64,
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        SimilarityMatcher::new(&EngineSettings::default())
    }
}

impl SimilarityMatcher {
    pub fn new(settings: &EngineSettings) -> Self {
        SimilarityMatcher {
            asn_weight: settings.asn_weight,
            deviation_weight: settings.deviation_weight,
            threshold: settings.similarity_threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Similarity of two patterns in [0, 1].
    ///
    /// Symmetric. Identical patterns score 1.0; patterns sharing no ASN
    /// score 0.0 regardless of timings.
    pub fn score(&self, a: &Pattern, b: &Pattern) -> SimilarityScore {
        let asns_a = a.asn_ids();
        let asns_b = b.asn_ids();
        let shared: BTreeSet<u32> = asns_a.intersection(&asns_b).copied().collect();
        let larger = asns_a.len().max(asns_b.len());

        if shared.is_empty() || larger == 0 {
            return SimilarityScore {
                similarity: 0.0,
                asn_match_ratio: 0.0,
                deviation_score: 0.0,
                matching_asn_count: 0,
                average_deviation_ms: 0.0,
            };
        }

        let asn_match_ratio = shared.len() as f64 / larger as f64;

        let by_asn_a = a.entry_by_asn();
        let by_asn_b = b.entry_by_asn();
        let mut normalized_drift = 0.0;
        let mut absolute_drift = 0.0;
        for asn in &shared {
            let (ea, eb) = (by_asn_a[asn], by_asn_b[asn]);
            normalized_drift += (ea.normalized_time - eb.normalized_time).abs();
            absolute_drift += (ea.absolute_time - eb.absolute_time).abs();
        }
        let count = shared.len() as f64;
        let mean_drift = normalized_drift / count;
        let deviation_score = (1.0 - 2.0 * mean_drift).max(0.0);

        let similarity = (self.asn_weight * asn_match_ratio
            + self.deviation_weight * deviation_score)
            .clamp(0.0, 1.0);

        SimilarityScore {
            similarity,
            asn_match_ratio,
            deviation_score,
            matching_asn_count: shared.len() as u32,
            average_deviation_ms: absolute_drift / count,
        }
    }

    /// Verifies that a signature hit really is the same pattern.
    pub fn verify_exact(&self, pattern: &Pattern, candidate: &Correlation) -> ExactCheck {
        match candidate.pattern() {
            Ok(stored) if canonical_string(&stored) == canonical_string(pattern) => {
                ExactCheck::Verified
            }
            Ok(_) => ExactCheck::Collision,
            Err(e) => ExactCheck::InvalidSnapshot(e),
        }
    }

    /// Scans clusters in the given order (most recently seen first) and
    /// returns the first one scoring strictly above the threshold.
    pub fn find_fuzzy<'a>(&self, pattern: &Pattern, clusters: &'a [Correlation]) -> FuzzyMatch<'a> {
        let mut skipped = Vec::new();
        for cluster in clusters {
            let stored = match cluster.pattern() {
                Ok(stored) => stored,
                Err(e) => {
                    skipped.push((cluster, e));
                    continue;
                }
            };
            let score = self.score(pattern, &stored);
            if score.similarity > self.threshold {
                return FuzzyMatch {
                    best: Some((cluster, score)),
                    skipped,
                };
            }
        }
        FuzzyMatch {
            best: None,
            skipped,
        }
    }
}
