//! Rule-based region classifier.
//!
//! Always available. With a correlation that carries an inferred country, the
//! region is picked among that country's metros. Without one, the browser
//! clock and locale give a coarse, capped guess.

use std::cmp::Ordering;
use std::sync::Arc;

use super::locale::country_from_locale;
use super::{Classification, ClassificationContext, RegionCandidate, RegionClassifier};
use crate::catalog::{Region, RegionCatalog};
use crate::config::{HEURISTIC_SIGNAL_CONFIDENCE_CAP, MAX_CANDIDATES};
use crate::error_handling::ModelError;

pub(crate) const STRATEGY_NAME: &str = "heuristic";

/// Deterministic classifier over the region catalog.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    catalog: Arc<RegionCatalog>,
}

impl HeuristicClassifier {
    pub fn new(catalog: Arc<RegionCatalog>) -> Self {
        HeuristicClassifier { catalog }
    }

    /// Picks a metro within the country the latency data points to.
    fn from_correlation(&self, context: &ClassificationContext) -> Option<Classification> {
        let correlation = context.correlation.as_ref()?;
        let country = correlation.inferred_country.as_deref()?;
        let regions = self.catalog.in_country(country);
        if regions.is_empty() {
            return None;
        }

        let by_name = correlation.inferred_region.as_deref().and_then(|hint| {
            let hint = hint.trim().to_lowercase();
            (!hint.is_empty())
                .then(|| {
                    regions
                        .iter()
                        .find(|r| r.region_name.to_lowercase().contains(&hint))
                })
                .flatten()
        });
        let by_distance = || {
            let point = context.reference_point?;
            regions
                .iter()
                .min_by(|a, b| {
                    a.location()
                        .distance_km(&point)
                        .total_cmp(&b.location().distance_km(&point))
                })
        };
        let chosen = by_name.or_else(by_distance).or(regions.first())?;

        let confidence = correlation.confidence.clamp(0.0, 1.0);
        let others: Vec<&Region> = regions
            .iter()
            .copied()
            .filter(|r| r.region_id != chosen.region_id)
            .take(MAX_CANDIDATES - 1)
            .collect();
        let share = if others.is_empty() {
            0.0
        } else {
            (1.0 - confidence) / others.len() as f64
        };

        let mut candidates = vec![RegionCandidate {
            region_id: chosen.region_id.clone(),
            confidence,
        }];
        candidates.extend(others.iter().map(|r| RegionCandidate {
            region_id: r.region_id.clone(),
            confidence: share,
        }));

        Some(Classification {
            region: (*chosen).clone(),
            confidence,
            candidates,
            strategy: STRATEGY_NAME,
        })
    }

    /// Ranks all metros by clock offset closeness and locale country.
    fn from_signals(&self, context: &ClassificationContext) -> Option<Classification> {
        let offset = context.timezone_offset_hours();
        let locale_country = context.locale.as_deref().and_then(country_from_locale);
        let signal_count = usize::from(offset.is_some()) + usize::from(locale_country.is_some());
        if signal_count == 0 {
            return None;
        }

        let mut scored: Vec<(&Region, f64)> = self
            .catalog
            .regions()
            .iter()
            .map(|region| {
                let clock = offset
                    .map(|hours| 1.0 / (1.0 + (hours - region.expected_utc_offset_hours()).abs()))
                    .unwrap_or(0.0);
                let locale_bonus = match &locale_country {
                    Some(country) if region.country_code.eq_ignore_ascii_case(country) => 1.0,
                    _ => 0.0,
                };
                (region, clock + locale_bonus)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|(ra, sa), (rb, sb)| match sb.total_cmp(sa) {
            Ordering::Equal => ra.region_name.cmp(&rb.region_name),
            other => other,
        });

        let scale = HEURISTIC_SIGNAL_CONFIDENCE_CAP / signal_count as f64;
        let candidates: Vec<RegionCandidate> = scored
            .iter()
            .take(MAX_CANDIDATES)
            .map(|(region, score)| RegionCandidate {
                region_id: region.region_id.clone(),
                confidence: (score * scale).min(HEURISTIC_SIGNAL_CONFIDENCE_CAP),
            })
            .collect();

        let (region, _) = scored.first()?;
        let confidence = candidates.first()?.confidence;
        Some(Classification {
            region: (*region).clone(),
            confidence,
            candidates,
            strategy: STRATEGY_NAME,
        })
    }
}

impl RegionClassifier for HeuristicClassifier {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    fn classify(&self, context: &ClassificationContext) -> Result<Option<Classification>, ModelError> {
        Ok(self
            .from_correlation(context)
            .or_else(|| self.from_signals(context)))
    }
}
