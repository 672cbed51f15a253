//! Visit rows and their inference result columns.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::engine::InferenceResult;
use crate::error_handling::DatabaseError;
use crate::probe::{SuspicionLevel, Visit};

/// Stores a visit before inference runs.
///
/// Re-delivering the same `visit_id` refreshes the context columns and keeps
/// any inference already recorded. Returns the row id.
pub async fn insert_visit(pool: &SqlitePool, visit: &Visit) -> Result<i64, DatabaseError> {
    let successful = visit
        .probes
        .iter()
        .filter(|p| p.usable_average().is_some())
        .count() as i64;

    let row = sqlx::query(
        "INSERT INTO visits (
            visit_id, visitor_id, observed_at_ms, timezone_offset_minutes, locale,
            geoip_country, is_likely_vpn, suspicion_level, vpn_reported_country,
            probe_count, successful_probe_count
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(visit_id) DO UPDATE SET
            visitor_id = excluded.visitor_id,
            observed_at_ms = excluded.observed_at_ms,
            timezone_offset_minutes = excluded.timezone_offset_minutes,
            locale = excluded.locale,
            geoip_country = excluded.geoip_country,
            is_likely_vpn = excluded.is_likely_vpn,
            suspicion_level = excluded.suspicion_level,
            vpn_reported_country = excluded.vpn_reported_country,
            probe_count = excluded.probe_count,
            successful_probe_count = excluded.successful_probe_count
        RETURNING id",
    )
    .bind(&visit.visit_id)
    .bind(&visit.visitor_id)
    .bind(visit.timestamp.timestamp_millis())
    .bind(visit.timezone_offset_minutes)
    .bind(&visit.locale)
    .bind(&visit.geoip_country)
    .bind(visit.vpn.is_likely_vpn)
    .bind(suspicion_label(visit.vpn.suspicion_level))
    .bind(&visit.vpn.reported_country)
    .bind(visit.probes.len() as i64)
    .bind(successful)
    .fetch_one(pool)
    .await?;

    Ok(row.try_get("id")?)
}

/// Writes the engine's answer onto the visit row.
///
/// `None` clears the region columns: the visit was processed and the region
/// is unknown.
pub async fn record_visit_inference(
    pool: &SqlitePool,
    visit_id: &str,
    result: Option<&InferenceResult>,
) -> Result<(), DatabaseError> {
    let candidates = result
        .map(|r| serde_json::to_string(&r.candidates))
        .transpose()?;
    let flags = result.map(|r| r.mismatches).unwrap_or_default();

    let updated = sqlx::query(
        "UPDATE visits SET
            inferred_region_id = ?,
            inferred_region_confidence = ?,
            inferred_region_candidates = ?,
            inference_strategy = ?,
            vpn_exit_mismatch = ?,
            geoip_mismatch = ?,
            timezone_mismatch = ?,
            inferred_at_ms = ?
         WHERE visit_id = ?",
    )
    .bind(result.map(|r| r.region_id.as_str()))
    .bind(result.map(|r| r.confidence))
    .bind(candidates)
    .bind(result.map(|r| r.strategy))
    .bind(flags.vpn_exit_mismatch)
    .bind(flags.geoip_mismatch)
    .bind(flags.timezone_mismatch)
    .bind(Utc::now().timestamp_millis())
    .bind(visit_id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(DatabaseError::SqlError(sqlx::Error::RowNotFound));
    }
    Ok(())
}

/// Region columns of a stored visit, as exported.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRegionRow {
    pub visit_id: String,
    pub visitor_id: String,
    pub observed_at: DateTime<Utc>,
    pub region_id: Option<String>,
    pub confidence: Option<f64>,
    /// Candidates as stored (JSON array of `{regionId, confidence}`)
    pub candidates: Option<serde_json::Value>,
    pub strategy: Option<String>,
    pub vpn_exit_mismatch: bool,
    pub geoip_mismatch: bool,
    pub timezone_mismatch: bool,
}

/// Region fields of stored visits, oldest first, optionally for one visitor.
pub async fn query_visit_regions(
    pool: &SqlitePool,
    visitor_id: Option<&str>,
) -> Result<Vec<VisitRegionRow>, DatabaseError> {
    let rows = sqlx::query(
        "SELECT visit_id, visitor_id, observed_at_ms, inferred_region_id,
                inferred_region_confidence, inferred_region_candidates, inference_strategy,
                vpn_exit_mismatch, geoip_mismatch, timezone_mismatch
         FROM visits
         WHERE (? IS NULL OR visitor_id = ?)
         ORDER BY observed_at_ms ASC, id ASC",
    )
    .bind(visitor_id)
    .bind(visitor_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<VisitRegionRow, DatabaseError> {
            let observed_at_ms: i64 = row.try_get("observed_at_ms")?;
            let candidates: Option<String> = row.try_get("inferred_region_candidates")?;
            Ok(VisitRegionRow {
                visit_id: row.try_get("visit_id")?,
                visitor_id: row.try_get("visitor_id")?,
                observed_at: DateTime::from_timestamp_millis(observed_at_ms).ok_or_else(|| {
                    DatabaseError::InvalidColumn {
                        column: "observed_at_ms",
                        value: observed_at_ms.to_string(),
                    }
                })?,
                region_id: row.try_get("inferred_region_id")?,
                confidence: row.try_get("inferred_region_confidence")?,
                candidates: candidates
                    .as_deref()
                    .map(|json| serde_json::from_str(json))
                    .transpose()?,
                strategy: row.try_get("inference_strategy")?,
                vpn_exit_mismatch: row.try_get("vpn_exit_mismatch")?,
                geoip_mismatch: row.try_get("geoip_mismatch")?,
                timezone_mismatch: row.try_get("timezone_mismatch")?,
            })
        })
        .collect()
}

fn suspicion_label(level: SuspicionLevel) -> &'static str {
    match level {
        SuspicionLevel::High => "high",
        SuspicionLevel::Medium => "medium",
        SuspicionLevel::Low => "low",
        SuspicionLevel::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::RegionCandidate;
    use crate::mismatch::MismatchFlags;
    use crate::pattern::test_support::{failed_probe, probe};
    use crate::probe::VpnSignal;
    use crate::storage::test_helpers::create_test_pool;
    use chrono::TimeZone;

    fn visit(visit_id: &str, visitor_id: &str, minute: u32) -> Visit {
        Visit {
            visit_id: visit_id.to_string(),
            visitor_id: visitor_id.to_string(),
            timestamp: Utc
                .with_ymd_and_hms(2024, 7, 1, 8, minute, 0)
                .single()
                .expect("valid timestamp"),
            timezone_offset_minutes: Some(120),
            locale: Some("de-DE".to_string()),
            geoip_country: Some("DE".to_string()),
            reference_point: None,
            vpn: VpnSignal::default(),
            probes: vec![probe(3320, 12.0, Some("DE")), failed_probe(1136)],
        }
    }

    fn result() -> InferenceResult {
        InferenceResult {
            region_id: "eu-fra".to_string(),
            region_name: "Frankfurt Metro".to_string(),
            country_code: "DE".to_string(),
            confidence: 0.62,
            candidates: vec![
                RegionCandidate {
                    region_id: "eu-fra".to_string(),
                    confidence: 0.62,
                },
                RegionCandidate {
                    region_id: "eu-ber".to_string(),
                    confidence: 0.38,
                },
            ],
            mismatches: MismatchFlags {
                vpn_exit_mismatch: false,
                geoip_mismatch: false,
                timezone_mismatch: true,
            },
            strategy: "heuristic",
            correlation_id: Some(1),
        }
    }

    #[tokio::test]
    async fn test_insert_visit_is_idempotent() {
        let pool = create_test_pool().await;
        let first = insert_visit(&pool, &visit("visit-1", "visitor-1", 0))
            .await
            .expect("insert succeeds");
        let again = insert_visit(&pool, &visit("visit-1", "visitor-1", 0))
            .await
            .expect("re-insert succeeds");
        assert_eq!(first, again);

        let (probes, successful): (i64, i64) = sqlx::query_as(
            "SELECT probe_count, successful_probe_count FROM visits WHERE visit_id = 'visit-1'",
        )
        .fetch_one(&pool)
        .await
        .expect("row exists");
        assert_eq!((probes, successful), (2, 1));
    }

    #[tokio::test]
    async fn test_record_and_query_inference() {
        let pool = create_test_pool().await;
        insert_visit(&pool, &visit("visit-1", "visitor-1", 0))
            .await
            .expect("insert succeeds");
        insert_visit(&pool, &visit("visit-2", "visitor-1", 5))
            .await
            .expect("insert succeeds");
        insert_visit(&pool, &visit("visit-3", "visitor-2", 1))
            .await
            .expect("insert succeeds");

        record_visit_inference(&pool, "visit-1", Some(&result()))
            .await
            .expect("record succeeds");
        record_visit_inference(&pool, "visit-2", None)
            .await
            .expect("record succeeds");

        let rows = query_visit_regions(&pool, Some("visitor-1"))
            .await
            .expect("query succeeds");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].region_id.as_deref(), Some("eu-fra"));
        assert_eq!(rows[0].confidence, Some(0.62));
        assert_eq!(rows[0].strategy.as_deref(), Some("heuristic"));
        assert!(rows[0].timezone_mismatch);
        assert_eq!(
            rows[0].candidates,
            Some(serde_json::json!([
                {"regionId": "eu-fra", "confidence": 0.62},
                {"regionId": "eu-ber", "confidence": 0.38}
            ]))
        );
        assert!(rows[1].region_id.is_none());
        assert!(rows[1].candidates.is_none());
        assert!(!rows[1].timezone_mismatch);

        let all = query_visit_regions(&pool, None)
            .await
            .expect("query succeeds");
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_record_unknown_visit_fails() {
        let pool = create_test_pool().await;
        let result = record_visit_inference(&pool, "missing", None).await;
        assert!(matches!(
            result,
            Err(DatabaseError::SqlError(sqlx::Error::RowNotFound))
        ));
    }
}
