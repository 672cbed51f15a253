//! Pattern data structures.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error_handling::SnapshotError;

/// One network in a latency fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternEntry {
    pub asn_id: u32,
    /// Latency relative to the fastest successful probe (fastest = 1.0)
    pub normalized_time: f64,
    /// Measured average latency in milliseconds
    pub absolute_time: f64,
    pub country_hint: Option<String>,
    pub region_hint: Option<String>,
}

/// A normalized latency fingerprint for one observation window.
///
/// Entries are ascending by `normalized_time`. An empty pattern means the
/// batch had no successful probes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    entries: Vec<PatternEntry>,
    fastest_asn: Option<u32>,
    fastest_time: Option<f64>,
}

impl Pattern {
    /// Builds a pattern from entries that are already normalized and sorted.
    pub(crate) fn from_sorted(entries: Vec<PatternEntry>) -> Self {
        let fastest_asn = entries.first().map(|e| e.asn_id);
        let fastest_time = entries.first().map(|e| e.absolute_time);
        Pattern {
            entries,
            fastest_asn,
            fastest_time,
        }
    }

    /// The explicit "no successful probes" pattern.
    pub fn empty() -> Self {
        Pattern::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    pub fn fastest_asn(&self) -> Option<u32> {
        self.fastest_asn
    }

    pub fn fastest_time(&self) -> Option<f64> {
        self.fastest_time
    }

    /// The `n` entries with the smallest normalized time.
    pub fn closest(&self, n: usize) -> &[PatternEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// Unique ASN ids in the pattern.
    pub fn asn_ids(&self) -> BTreeSet<u32> {
        self.entries.iter().map(|e| e.asn_id).collect()
    }

    /// First (lowest-latency) entry per ASN id.
    ///
    /// Several targets can sit in one ASN; the closest one represents it.
    pub fn entry_by_asn(&self) -> HashMap<u32, &PatternEntry> {
        let mut by_asn = HashMap::with_capacity(self.entries.len());
        for entry in &self.entries {
            by_asn.entry(entry.asn_id).or_insert(entry);
        }
        by_asn
    }

    /// Serializes the pattern into the snapshot stored on a cluster.
    pub fn to_snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a stored cluster snapshot and checks the pattern invariants.
    pub fn from_snapshot(snapshot: &str) -> Result<Self, SnapshotError> {
        let pattern: Pattern = serde_json::from_str(snapshot)?;
        if pattern.entries.is_empty() {
            return Err(SnapshotError::Empty);
        }
        let ordered = pattern
            .entries
            .windows(2)
            .all(|w| w[0].normalized_time <= w[1].normalized_time);
        if !ordered {
            return Err(SnapshotError::Unordered);
        }
        Ok(pattern)
    }
}
