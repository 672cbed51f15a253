//! Processing statistics tracking.
//!
//! Thread-safe counters for the failures the engine contained and the
//! notable events of a run (cluster placements, answering strategy).

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use strum::IntoEnumIterator;

use super::types::{ErrorType, InfoType};

/// One atomic counter per variant of `K`, all present from construction.
struct CounterTable<K> {
    counters: HashMap<K, AtomicUsize>,
}

impl<K: IntoEnumIterator + Eq + Hash + Copy + std::fmt::Debug> CounterTable<K> {
    fn new() -> Self {
        CounterTable {
            counters: K::iter().map(|k| (k, AtomicUsize::new(0))).collect(),
        }
    }

    fn increment(&self, key: K) {
        match self.counters.get(&key) {
            Some(counter) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            None => log::error!("No counter registered for {:?}", key),
        }
    }

    fn get(&self, key: K) -> usize {
        self.counters
            .get(&key)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn total(&self) -> usize {
        K::iter().map(|k| self.get(k)).sum()
    }
}

/// Thread-safe processing statistics tracker.
///
/// Shared by `Arc` between the engine and the run loop.
///
/// # Categories
///
/// - **Errors**: Failures contained by the engine (the visit still proceeds)
/// - **Info**: Notable events such as cluster matches and which strategy answered
pub struct ProcessingStats {
    errors: CounterTable<ErrorType>,
    info: CounterTable<InfoType>,
}

/// Non-zero counters at one point in time, keyed by their display label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub errors: BTreeMap<&'static str, usize>,
    pub info: BTreeMap<&'static str, usize>,
}

impl Default for ProcessingStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProcessingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingStats")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl ProcessingStats {
    pub fn new() -> Self {
        ProcessingStats {
            errors: CounterTable::new(),
            info: CounterTable::new(),
        }
    }

    pub fn increment_error(&self, error: ErrorType) {
        self.errors.increment(error);
    }

    pub fn increment_info(&self, info_type: InfoType) {
        self.info.increment(info_type);
    }

    pub fn get_error_count(&self, error: ErrorType) -> usize {
        self.errors.get(error)
    }

    pub fn get_info_count(&self, info_type: InfoType) -> usize {
        self.info.get(info_type)
    }

    pub fn total_errors(&self) -> usize {
        self.errors.total()
    }

    pub fn total_info(&self) -> usize {
        self.info.total()
    }

    /// Copies out every non-zero counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            errors: ErrorType::iter()
                .map(|e| (e.as_str(), self.get_error_count(e)))
                .filter(|(_, count)| *count > 0)
                .collect(),
            info: InfoType::iter()
                .map(|i| (i.as_str(), self.get_info_count(i)))
                .filter(|(_, count)| *count > 0)
                .collect(),
        }
    }
}
