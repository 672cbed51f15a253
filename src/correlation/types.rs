//! Correlation cluster data structures.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error_handling::SnapshotError;
use crate::pattern::{Pattern, PatternSignature};

/// A visitor-scoped cluster of observations believed to share one network
/// fingerprint.
///
/// `signature` is always the signature of `pattern_snapshot`, the last pattern
/// the cluster accepted. `observation_count` only ever grows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    /// Store id; `None` until the cluster has been inserted
    pub id: Option<i64>,
    pub visitor_id: String,
    pub signature: PatternSignature,
    pub pattern_snapshot: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub observation_count: u32,
    pub inferred_country: Option<String>,
    pub inferred_region: Option<String>,
    /// Location inference certainty in [0, 1]
    pub confidence: f64,
    /// Similarity to the pattern that triggered the last update
    pub similarity_score: f64,
    pub matching_asn_count: u32,
    /// Mean absolute latency drift in ms across shared ASNs at the last merge
    pub average_deviation_ms: f64,
    pub vpn_flag: bool,
    /// Country inferred from latency while the visitor was behind a VPN
    pub vpn_true_location: Option<String>,
}

impl Correlation {
    /// Starts a new cluster from a pattern seen for the first time.
    pub fn new_cluster(
        visitor_id: &str,
        pattern: &Pattern,
        signature: PatternSignature,
        seen_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Correlation {
            id: None,
            visitor_id: visitor_id.to_string(),
            signature,
            pattern_snapshot: pattern.to_snapshot()?,
            first_seen: seen_at,
            last_seen: seen_at,
            observation_count: 1,
            inferred_country: None,
            inferred_region: None,
            confidence: 0.0,
            similarity_score: 1.0,
            matching_asn_count: pattern.asn_ids().len() as u32,
            average_deviation_ms: 0.0,
            vpn_flag: false,
            vpn_true_location: None,
        })
    }

    /// Parses the stored snapshot back into a pattern.
    pub fn pattern(&self) -> Result<Pattern, SnapshotError> {
        Pattern::from_snapshot(&self.pattern_snapshot)
    }

    /// Folds a newly accepted pattern into this cluster.
    pub fn absorb(
        &mut self,
        pattern: &Pattern,
        signature: PatternSignature,
        score: &SimilarityScore,
        seen_at: DateTime<Utc>,
    ) -> Result<(), serde_json::Error> {
        self.pattern_snapshot = pattern.to_snapshot()?;
        self.signature = signature;
        // Out-of-order arrivals must not move last_seen backwards
        self.last_seen = self.last_seen.max(seen_at);
        self.observation_count = self.observation_count.saturating_add(1);
        self.similarity_score = score.similarity;
        self.matching_asn_count = score.matching_asn_count;
        self.average_deviation_ms = score.average_deviation_ms;
        Ok(())
    }
}

/// Breakdown of a similarity computation between two patterns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScore {
    /// Weighted score, clamped to [0, 1]
    pub similarity: f64,
    pub asn_match_ratio: f64,
    pub deviation_score: f64,
    pub matching_asn_count: u32,
    pub average_deviation_ms: f64,
}

impl SimilarityScore {
    /// Score of a pattern against itself.
    pub fn identical(pattern: &Pattern) -> Self {
        SimilarityScore {
            similarity: 1.0,
            asn_match_ratio: 1.0,
            deviation_score: 1.0,
            matching_asn_count: pattern.asn_ids().len() as u32,
            average_deviation_ms: 0.0,
        }
    }
}
