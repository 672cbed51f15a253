//! Engine output types.

use serde::Serialize;

use crate::classifier::RegionCandidate;
use crate::mismatch::MismatchFlags;

/// Region inference attached to one visit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceResult {
    pub region_id: String,
    pub region_name: String,
    pub country_code: String,
    /// In [0, 1]
    pub confidence: f64,
    /// At most five ranked alternatives, best first
    pub candidates: Vec<RegionCandidate>,
    pub mismatches: MismatchFlags,
    /// Strategy that produced the region
    pub strategy: &'static str,
    /// Cluster the visit was correlated into, if any
    pub correlation_id: Option<i64>,
}

/// How a visit's pattern was placed into the visitor's clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPlacement {
    /// The batch had no successful probes
    Skipped,
    Exact,
    Fuzzy,
    Created,
}
