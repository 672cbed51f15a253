//! Feature extraction for the learned region model.
//!
//! The order and scaling of these features is fixed by the training pipeline
//! and must not change without retraining the model.

use chrono::{Datelike, Timelike};

use crate::classifier::ClassificationContext;
use crate::config::{MATCHING_ASN_SCALE, RTT_NORMALIZE_FLOOR_MS, RTT_NORMALIZE_RANGE_MS};

/// Feature names in model input order, as listed in the model metadata.
pub const FEATURE_NAMES: [&str; 10] = [
    "correlation_average_deviation",
    "correlation_pattern_similarity",
    "correlation_matching_asns",
    "correlation_has_history",
    "timezone_offset_hours",
    "is_vpn_or_proxy",
    "suspicion_score",
    "hour_of_day",
    "weekday",
    "locale_score",
];

/// Turns a classification context into a model input row.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, context: &ClassificationContext) -> Vec<f32>;
}

/// The ten visit features the shipped model was trained on.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisitFeatures;

impl FeatureExtractor for VisitFeatures {
    fn extract(&self, context: &ClassificationContext) -> Vec<f32> {
        let mut features = Vec::with_capacity(FEATURE_NAMES.len());

        match &context.correlation {
            Some(correlation) => {
                features.push(
                    ((correlation.average_deviation_ms - RTT_NORMALIZE_FLOOR_MS)
                        / RTT_NORMALIZE_RANGE_MS)
                        .clamp(0.0, 1.0),
                );
                features.push(correlation.similarity_score);
                features.push(f64::from(correlation.matching_asn_count) / MATCHING_ASN_SCALE);
                features.push(if correlation.observation_count > 0 { 1.0 } else { 0.0 });
            }
            None => features.extend([0.0; 4]),
        }

        features.push(
            context
                .timezone_offset_hours()
                .map(|hours| (hours / 12.0).clamp(-1.0, 1.0))
                .unwrap_or(0.0),
        );
        features.push(if context.vpn.is_likely_vpn { 1.0 } else { 0.0 });
        features.push(context.vpn.suspicion_level.score());
        features.push(f64::from(context.timestamp.hour()) / 24.0);
        features.push(f64::from(context.timestamp.weekday().num_days_from_monday()) / 7.0);
        features.push(match context.locale.as_deref() {
            Some(locale) if locale.len() > 2 => 0.5,
            _ => 0.0,
        });

        features.into_iter().map(|f| f as f32).collect()
    }
}
