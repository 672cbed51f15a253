//! Country and region inference from the closest probes of a pattern.

use crate::config::{EngineSettings, NO_FIXED_LOCATION_HINTS};
use crate::pattern::{Pattern, PatternEntry};
use crate::probe::VpnSignal;

use super::types::Correlation;

/// Location estimate derived from one pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEstimate {
    pub country: Option<String>,
    pub region: Option<String>,
    /// `min(1, winning votes / N)`, 0.0 when no country could be voted
    pub confidence: f64,
}

impl LocationEstimate {
    fn unknown() -> Self {
        LocationEstimate {
            country: None,
            region: None,
            confidence: 0.0,
        }
    }
}

/// Votes a country and region out of the N lowest-latency probes.
#[derive(Debug, Clone)]
pub struct LocationInferer {
    closest_count: usize,
}

impl Default for LocationInferer {
    fn default() -> Self {
        LocationInferer::new(&EngineSettings::default())
    }
}

impl LocationInferer {
    pub fn new(settings: &EngineSettings) -> Self {
        LocationInferer {
            closest_count: settings.closest_probe_count.max(1),
        }
    }

    pub fn infer(&self, pattern: &Pattern) -> LocationEstimate {
        let closest = pattern.closest(self.closest_count);

        let Some((country, votes)) = majority(
            closest
                .iter()
                .filter_map(|e| fixed_location_hint(e.country_hint.as_deref())),
        ) else {
            return LocationEstimate::unknown();
        };
        let country = country.to_ascii_uppercase();

        let region = majority(
            closest
                .iter()
                .filter(|e| in_country(e, &country))
                .filter_map(|e| fixed_location_hint(e.region_hint.as_deref())),
        )
        .map(|(region, _)| region);

        LocationEstimate {
            confidence: (votes as f64 / self.closest_count as f64).min(1.0),
            country: Some(country),
            region,
        }
    }

    /// Writes an estimate and the visit's VPN signal onto a cluster.
    ///
    /// An estimate without a country leaves the previous inference in place.
    /// Returns true when the latency-inferred country contradicts the country
    /// the VPN reports.
    pub fn apply(
        &self,
        correlation: &mut Correlation,
        estimate: &LocationEstimate,
        vpn: &VpnSignal,
    ) -> bool {
        if let Some(country) = &estimate.country {
            correlation.inferred_country = Some(country.clone());
            correlation.inferred_region = estimate.region.clone();
            correlation.confidence = estimate.confidence;
        }

        correlation.vpn_flag = vpn.is_likely_vpn;
        if !vpn.is_likely_vpn {
            return false;
        }

        if let Some(country) = &estimate.country {
            correlation.vpn_true_location = Some(country.clone());
        }
        match (&correlation.vpn_true_location, &vpn.reported_country) {
            (Some(true_location), Some(reported)) => !true_location.eq_ignore_ascii_case(reported),
            _ => false,
        }
    }
}

fn in_country(entry: &PatternEntry, country: &str) -> bool {
    entry
        .country_hint
        .as_deref()
        .is_some_and(|c| c.trim().eq_ignore_ascii_case(country))
}

/// Trims a hint and drops empty values and no-fixed-location sentinels.
fn fixed_location_hint(hint: Option<&str>) -> Option<&str> {
    let hint = hint?.trim();
    if hint.is_empty()
        || NO_FIXED_LOCATION_HINTS
            .iter()
            .any(|sentinel| sentinel.eq_ignore_ascii_case(hint))
    {
        return None;
    }
    Some(hint)
}

/// Most frequent value, ignoring ASCII case; ties go to the value encountered
/// first, and the winner keeps its first-seen spelling.
fn majority<'a>(values: impl Iterator<Item = &'a str>) -> Option<(String, usize)> {
    let mut tally: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match tally.iter_mut().find(|(v, _)| v.eq_ignore_ascii_case(value)) {
            Some((_, count)) => *count += 1,
            None => tally.push((value, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in tally {
        match best {
            Some((_, top)) if count <= top => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(value, count)| (value.to_string(), count))
}
