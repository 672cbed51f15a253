//! Probe and visit records.
//!
//! The probe collector hands over loosely-typed JSON. Everything is validated
//! once here and converted into explicit records; the rest of the crate never
//! sees optional-everywhere payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::GeoPoint;
use crate::error_handling::InputError;

/// One latency sample against a probe target.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub asn_id: u32,
    pub asn_name: String,
    pub country_hint: Option<String>,
    pub region_hint: Option<String>,
    pub target: String,
    pub success: bool,
    pub average_ms: Option<f64>,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub attempts: u32,
    pub successful_attempts: u32,
}

impl ProbeResult {
    /// Returns the average latency if this probe can take part in a pattern.
    ///
    /// Failed probes and probes without a positive, finite average are unusable.
    pub fn usable_average(&self) -> Option<f64> {
        if !self.success {
            return None;
        }
        self.average_ms.filter(|avg| avg.is_finite() && *avg > 0.0)
    }
}

/// Wire form of a probe as sent by the collector.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProbe {
    pub asn_id: Option<u32>,
    pub asn_name: Option<String>,
    pub country_hint: Option<String>,
    pub region_hint: Option<String>,
    pub target: Option<String>,
    pub success: Option<bool>,
    pub average_ms: Option<f64>,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub attempts: Option<u32>,
    pub successful_attempts: Option<u32>,
}

impl TryFrom<RawProbe> for ProbeResult {
    type Error = InputError;

    fn try_from(raw: RawProbe) -> Result<Self, Self::Error> {
        Ok(ProbeResult {
            asn_id: raw.asn_id.ok_or(InputError::MissingField("asnId"))?,
            asn_name: raw.asn_name.ok_or(InputError::MissingField("asnName"))?,
            country_hint: non_blank(raw.country_hint).map(|c| c.to_ascii_uppercase()),
            region_hint: non_blank(raw.region_hint),
            target: raw.target.ok_or(InputError::MissingField("target"))?,
            success: raw.success.ok_or(InputError::MissingField("success"))?,
            average_ms: raw.average_ms,
            min_ms: raw.min_ms,
            max_ms: raw.max_ms,
            jitter_ms: raw.jitter_ms,
            attempts: raw.attempts.ok_or(InputError::MissingField("attempts"))?,
            successful_attempts: raw
                .successful_attempts
                .ok_or(InputError::MissingField("successfulAttempts"))?,
        })
    }
}

/// How strongly the upstream VPN/proxy detector suspects a tunnel.
///
/// Defaults to `Low` when the detector reported no level, mirroring the
/// training pipeline's feature encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuspicionLevel {
    High,
    Medium,
    #[default]
    Low,
    /// Any level string the detector emits that we do not recognise
    #[serde(other)]
    Unknown,
}

impl SuspicionLevel {
    /// Numeric score used as a model feature.
    pub fn score(self) -> f64 {
        match self {
            SuspicionLevel::High => 1.0,
            SuspicionLevel::Medium => 0.5,
            SuspicionLevel::Low => 0.25,
            SuspicionLevel::Unknown => 0.0,
        }
    }
}

/// VPN/proxy detection already recorded for the visit.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnSignal {
    #[serde(default)]
    pub is_likely_vpn: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub suspicion_level: SuspicionLevel,
    /// Country of the exit IP as reported by IP geolocation
    #[serde(default)]
    pub reported_country: Option<String>,
}

/// Detectors emit `null` when they ran but could not score the visit.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A validated visit ready for region inference.
#[derive(Debug, Clone)]
pub struct Visit {
    pub visit_id: String,
    pub visitor_id: String,
    pub timestamp: DateTime<Utc>,
    /// Browser UTC offset in minutes east of UTC (UTC+2 is 120)
    pub timezone_offset_minutes: Option<i32>,
    pub locale: Option<String>,
    pub geoip_country: Option<String>,
    pub reference_point: Option<GeoPoint>,
    pub vpn: VpnSignal,
    pub probes: Vec<ProbeResult>,
}

impl Visit {
    /// Offset in hours east of UTC, if the browser reported one.
    pub fn timezone_offset_hours(&self) -> Option<f64> {
        self.timezone_offset_minutes.map(|m| f64::from(m) / 60.0)
    }
}

/// Wire form of a visit record (one NDJSON line).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVisit {
    pub visit_id: Option<String>,
    pub visitor_id: Option<String>,
    pub timestamp: Option<String>,
    pub timezone_offset_minutes: Option<i32>,
    pub locale: Option<String>,
    pub geoip_country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub vpn: Option<VpnSignal>,
    #[serde(default)]
    pub probes: Vec<RawProbe>,
}

impl TryFrom<RawVisit> for Visit {
    type Error = InputError;

    fn try_from(raw: RawVisit) -> Result<Self, Self::Error> {
        let visit_id = non_blank(raw.visit_id).ok_or(InputError::MissingField("visitId"))?;
        let visitor_id =
            non_blank(raw.visitor_id).ok_or(InputError::MissingField("visitorId"))?;
        let timestamp_str = raw.timestamp.ok_or(InputError::MissingField("timestamp"))?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|e| InputError::InvalidField {
                field: "timestamp",
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        let reference_point = match (raw.latitude, raw.longitude) {
            (Some(latitude), Some(longitude)) => Some(
                GeoPoint::new(latitude, longitude).ok_or_else(|| InputError::InvalidField {
                    field: "latitude/longitude",
                    reason: format!("({latitude}, {longitude}) is not a coordinate"),
                })?,
            ),
            _ => None,
        };

        let probes = raw
            .probes
            .into_iter()
            .map(ProbeResult::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Visit {
            visit_id,
            visitor_id,
            timestamp,
            timezone_offset_minutes: raw.timezone_offset_minutes,
            locale: non_blank(raw.locale),
            geoip_country: non_blank(raw.geoip_country).map(|c| c.to_ascii_uppercase()),
            reference_point,
            vpn: raw.vpn.unwrap_or_default(),
            probes,
        })
    }
}

/// Parses and validates one NDJSON visit line.
pub fn parse_visit_line(line: &str) -> Result<Visit, InputError> {
    let raw: RawVisit = serde_json::from_str(line)?;
    Visit::try_from(raw)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
