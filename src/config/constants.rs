//! Configuration constants.
//!
//! This module defines the default tuning values for pattern correlation and
//! region inference, plus the operational limits of the engine.
//!
//! The similarity weights, the match threshold and the closest-probe count
//! have no derivation behind them; they are defaults, overridable through
//! [`EngineSettings`](super::EngineSettings).

use std::time::Duration;

pub const DB_PATH: &str = "./latency_region.db";
pub const LOGGING_INTERVAL: usize = 100;

// Pattern correlation
/// Weight of the ASN overlap ratio in the similarity score
pub const DEFAULT_ASN_WEIGHT: f64 = 0.6;
/// Weight of the timing deviation score in the similarity score
pub const DEFAULT_DEVIATION_WEIGHT: f64 = 0.4;
/// A cluster is accepted when its similarity strictly exceeds this value
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;
/// Number of lowest-latency networks considered by the location vote
pub const DEFAULT_CLOSEST_PROBE_COUNT: usize = 5;
/// Decimal places kept for normalized times in the canonical pattern string
pub const SIGNATURE_DECIMALS: usize = 4;

/// Country hints that carry no fixed location (anycast / CDN probes).
pub const NO_FIXED_LOCATION_HINTS: &[&str] = &["CDN", "ANYCAST"];

// Mismatch detection
/// Allowed distance in hours between the visit offset and the region offset
pub const DEFAULT_TIMEZONE_TOLERANCE_HOURS: f64 = 2.5;

// Heuristic classifier
/// Upper bound on confidence when no correlation data is available
pub const HEURISTIC_SIGNAL_CONFIDENCE_CAP: f64 = 0.7;

// Classification output
/// Maximum ranked candidates returned with a classification
pub const MAX_CANDIDATES: usize = 5;

// Learned classifier
/// Per-visit budget for a learned-model inference before falling back
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_millis(250);
/// Blocking workers reserved for model inference
pub const DEFAULT_MODEL_WORKERS: usize = 2;
/// Default artifact names produced by the training pipeline
pub const DEFAULT_MODEL_FILE: &str = "Models/inferred_region.onnx";
pub const DEFAULT_MODEL_METADATA_FILE: &str = "Models/inferred_region-metadata.json";

// Feature normalization (must match the training pipeline)
pub const RTT_NORMALIZE_FLOOR_MS: f64 = 10.0;
pub const RTT_NORMALIZE_RANGE_MS: f64 = 490.0;
pub const MATCHING_ASN_SCALE: f64 = 50.0;

// Visitor lock table
/// Idle lock entries are pruned once the table grows past this size
pub const VISITOR_LOCK_PRUNE_THRESHOLD: usize = 1024;
