//! Pattern construction from a probe batch.

use std::cmp::Ordering;

use super::types::{Pattern, PatternEntry};
use crate::probe::ProbeResult;

/// Builds a normalized, ordered pattern from one measurement batch.
///
/// Failed probes and probes without a usable average are dropped. When nothing
/// survives, the explicit empty pattern is returned; callers must skip
/// correlation for it.
///
/// The result does not depend on the order the probes arrived in: entries are
/// sorted by normalized time, with ties broken by ASN id and then by hints.
pub fn build_pattern(probes: &[ProbeResult]) -> Pattern {
    let successes: Vec<(&ProbeResult, f64)> = probes
        .iter()
        .filter_map(|probe| probe.usable_average().map(|avg| (probe, avg)))
        .collect();

    let Some(fastest_time) = successes
        .iter()
        .map(|(_, avg)| *avg)
        .min_by(|a, b| a.total_cmp(b))
    else {
        return Pattern::empty();
    };

    let mut entries: Vec<PatternEntry> = successes
        .into_iter()
        .map(|(probe, avg)| PatternEntry {
            asn_id: probe.asn_id,
            // x / x is exactly 1.0 for the fastest probe
            normalized_time: avg / fastest_time,
            absolute_time: avg,
            country_hint: probe.country_hint.clone(),
            region_hint: probe.region_hint.clone(),
        })
        .collect();

    entries.sort_by(compare_entries);
    Pattern::from_sorted(entries)
}

fn compare_entries(a: &PatternEntry, b: &PatternEntry) -> Ordering {
    a.normalized_time
        .total_cmp(&b.normalized_time)
        .then_with(|| a.asn_id.cmp(&b.asn_id))
        .then_with(|| a.country_hint.cmp(&b.country_hint))
        .then_with(|| a.region_hint.cmp(&b.region_hint))
}
