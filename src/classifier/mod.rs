//! Region classification strategies.
//!
//! A [`RegionClassifier`] turns the signals of one visit (clock, locale, VPN
//! indicator, the visitor's latest correlation) into a metro region. The
//! [`CompositeClassifier`] asks its strategies in order and returns the first
//! result; the learned model leads and the heuristic backs it up.

mod composite;
mod heuristic;
pub mod learned;
mod locale;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{GeoPoint, Region};
use crate::correlation::Correlation;
use crate::error_handling::ModelError;
use crate::probe::{Visit, VpnSignal};

// Re-export public API
pub use composite::{CompositeClassifier, CompositeOutcome};
pub use heuristic::HeuristicClassifier;
pub use learned::LearnedClassifier;
pub use locale::country_from_locale;

/// Everything a strategy may look at for one visit.
#[derive(Debug, Clone)]
pub struct ClassificationContext {
    pub timestamp: DateTime<Utc>,
    /// Minutes east of UTC
    pub timezone_offset_minutes: Option<i32>,
    pub locale: Option<String>,
    pub vpn: VpnSignal,
    pub reference_point: Option<GeoPoint>,
    /// The visitor's most recently seen cluster
    pub correlation: Option<Correlation>,
}

impl ClassificationContext {
    pub fn from_visit(visit: &Visit, correlation: Option<Correlation>) -> Self {
        ClassificationContext {
            timestamp: visit.timestamp,
            timezone_offset_minutes: visit.timezone_offset_minutes,
            locale: visit.locale.clone(),
            vpn: visit.vpn.clone(),
            reference_point: visit.reference_point,
            correlation,
        }
    }

    pub fn timezone_offset_hours(&self) -> Option<f64> {
        self.timezone_offset_minutes.map(|m| f64::from(m) / 60.0)
    }
}

/// One ranked alternative region.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCandidate {
    pub region_id: String,
    pub confidence: f64,
}

/// A region chosen by one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub region: Region,
    /// In [0, 1]
    pub confidence: f64,
    /// At most five, best first; the chosen region comes first
    pub candidates: Vec<RegionCandidate>,
    /// Name of the strategy that answered
    pub strategy: &'static str,
}

/// A region classification strategy.
///
/// `Ok(None)` means the strategy has nothing to say for this visit, which is
/// different from a low-confidence answer. `Err` means the strategy is broken
/// for this visit; callers treat it like `Ok(None)` after reporting it.
pub trait RegionClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, context: &ClassificationContext) -> Result<Option<Classification>, ModelError>;

    /// Strategies that burn CPU are run on the blocking pool under a timeout.
    fn is_cpu_bound(&self) -> bool {
        false
    }
}
