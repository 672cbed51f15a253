//! Disagreement flags between independent location signals.
//!
//! Once a region has been chosen, it is compared with what the VPN reports,
//! what GeoIP says and what the browser clock implies. Each flag is computed
//! independently; a flag that cannot be evaluated (missing input) is false.

use serde::Serialize;

use crate::catalog::Region;
use crate::config::{EngineSettings, DEFAULT_TIMEZONE_TOLERANCE_HOURS};
use crate::correlation::Correlation;
use crate::probe::Visit;

/// The three mismatch flags attached to a visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchFlags {
    pub vpn_exit_mismatch: bool,
    pub geoip_mismatch: bool,
    pub timezone_mismatch: bool,
}

impl MismatchFlags {
    pub fn any(&self) -> bool {
        self.vpn_exit_mismatch || self.geoip_mismatch || self.timezone_mismatch
    }
}

#[derive(Debug, Clone)]
pub struct MismatchDetector {
    timezone_tolerance_hours: f64,
}

impl Default for MismatchDetector {
    fn default() -> Self {
        MismatchDetector {
            timezone_tolerance_hours: DEFAULT_TIMEZONE_TOLERANCE_HOURS,
        }
    }
}

impl MismatchDetector {
    pub fn new(settings: &EngineSettings) -> Self {
        MismatchDetector {
            timezone_tolerance_hours: settings.timezone_tolerance_hours,
        }
    }

    pub fn detect(
        &self,
        visit: &Visit,
        region: &Region,
        correlation: Option<&Correlation>,
    ) -> MismatchFlags {
        MismatchFlags {
            vpn_exit_mismatch: vpn_exit_mismatch(visit, region, correlation),
            geoip_mismatch: visit
                .geoip_country
                .as_deref()
                .is_some_and(|geoip| !geoip.eq_ignore_ascii_case(&region.country_code)),
            timezone_mismatch: visit.timezone_offset_hours().is_some_and(|offset| {
                (offset - region.expected_utc_offset_hours()).abs() > self.timezone_tolerance_hours
            }),
        }
    }
}

/// The visitor is behind a VPN and latency places them somewhere other than
/// the exit the VPN reports, or somewhere other than the chosen region.
fn vpn_exit_mismatch(visit: &Visit, region: &Region, correlation: Option<&Correlation>) -> bool {
    if !visit.vpn.is_likely_vpn {
        return false;
    }
    let Some(true_location) = correlation.and_then(|c| c.vpn_true_location.as_deref()) else {
        return false;
    };
    let differs_from_reported = visit
        .vpn
        .reported_country
        .as_deref()
        .is_some_and(|reported| !reported.eq_ignore_ascii_case(true_location));
    differs_from_reported || !region.country_code.eq_ignore_ascii_case(true_location)
}
