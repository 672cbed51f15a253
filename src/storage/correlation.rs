//! Correlation cluster persistence.
//!
//! The engine talks to the store through [`CorrelationRepository`] so that the
//! clustering logic does not depend on SQLite. [`SqliteCorrelationRepository`]
//! is the shipped implementation.

use std::future::Future;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::correlation::Correlation;
use crate::error_handling::DatabaseError;
use crate::pattern::PatternSignature;

const SELECT_COLUMNS: &str = "id, visitor_id, signature, pattern_snapshot, first_seen_ms, last_seen_ms,
     observation_count, inferred_country, inferred_region, confidence, similarity_score,
     matching_asn_count, average_deviation_ms, vpn_flag, vpn_true_location";

/// Per-visitor cluster store.
///
/// Implementations must be safe to share across tasks. Writers for one
/// visitor are serialized by the engine; implementations still have to keep
/// `(visitor_id, signature)` unique.
pub trait CorrelationRepository: Send + Sync {
    /// Cluster of a visitor stored under exactly this signature.
    fn find_by_signature(
        &self,
        visitor_id: &str,
        signature: &PatternSignature,
    ) -> impl Future<Output = Result<Option<Correlation>, DatabaseError>> + Send;

    /// All clusters of a visitor, most recently seen first.
    fn list_for_visitor(
        &self,
        visitor_id: &str,
    ) -> impl Future<Output = Result<Vec<Correlation>, DatabaseError>> + Send;

    /// The visitor's most recently seen cluster.
    fn latest_for_visitor(
        &self,
        visitor_id: &str,
    ) -> impl Future<Output = Result<Option<Correlation>, DatabaseError>> + Send;

    /// Stores a new cluster and returns it with its id.
    ///
    /// If a cluster with the same visitor and signature already exists, that
    /// row absorbs the observation instead of a duplicate being created.
    fn insert(
        &self,
        correlation: &Correlation,
    ) -> impl Future<Output = Result<Correlation, DatabaseError>> + Send;

    /// Writes back a cluster previously read from this store.
    fn update(
        &self,
        correlation: &Correlation,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;
}

/// [`CorrelationRepository`] over the `correlations` table.
#[derive(Debug, Clone)]
pub struct SqliteCorrelationRepository {
    pool: SqlitePool,
}

impl SqliteCorrelationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteCorrelationRepository { pool }
    }
}

impl CorrelationRepository for SqliteCorrelationRepository {
    fn find_by_signature(
        &self,
        visitor_id: &str,
        signature: &PatternSignature,
    ) -> impl Future<Output = Result<Option<Correlation>, DatabaseError>> + Send {
        async move {
            let row = sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM correlations WHERE visitor_id = ? AND signature = ?"
            ))
            .bind(visitor_id)
            .bind(signature.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(correlation_from_row).transpose()
        }
    }

    fn list_for_visitor(
        &self,
        visitor_id: &str,
    ) -> impl Future<Output = Result<Vec<Correlation>, DatabaseError>> + Send {
        async move {
            let rows = sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM correlations
                 WHERE visitor_id = ?
                 ORDER BY last_seen_ms DESC, id DESC"
            ))
            .bind(visitor_id)
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(correlation_from_row).collect()
        }
    }

    fn latest_for_visitor(
        &self,
        visitor_id: &str,
    ) -> impl Future<Output = Result<Option<Correlation>, DatabaseError>> + Send {
        async move {
            let row = sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM correlations
                 WHERE visitor_id = ?
                 ORDER BY last_seen_ms DESC, id DESC
                 LIMIT 1"
            ))
            .bind(visitor_id)
            .fetch_optional(&self.pool)
            .await?;
            row.as_ref().map(correlation_from_row).transpose()
        }
    }

    fn insert(
        &self,
        correlation: &Correlation,
    ) -> impl Future<Output = Result<Correlation, DatabaseError>> + Send {
        async move {
            let row = sqlx::query(&format!(
                "INSERT INTO correlations (
                    visitor_id, signature, pattern_snapshot, first_seen_ms, last_seen_ms,
                    observation_count, inferred_country, inferred_region, confidence,
                    similarity_score, matching_asn_count, average_deviation_ms, vpn_flag,
                    vpn_true_location
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(visitor_id, signature) DO UPDATE SET
                    pattern_snapshot = excluded.pattern_snapshot,
                    last_seen_ms = MAX(correlations.last_seen_ms, excluded.last_seen_ms),
                    first_seen_ms = MIN(correlations.first_seen_ms, excluded.first_seen_ms),
                    observation_count = correlations.observation_count + excluded.observation_count,
                    inferred_country = COALESCE(excluded.inferred_country, correlations.inferred_country),
                    inferred_region = COALESCE(excluded.inferred_region, correlations.inferred_region),
                    confidence = excluded.confidence,
                    similarity_score = excluded.similarity_score,
                    matching_asn_count = excluded.matching_asn_count,
                    average_deviation_ms = excluded.average_deviation_ms,
                    vpn_flag = excluded.vpn_flag,
                    vpn_true_location = COALESCE(excluded.vpn_true_location, correlations.vpn_true_location)
                RETURNING {SELECT_COLUMNS}"
            ))
            .bind(&correlation.visitor_id)
            .bind(correlation.signature.as_str())
            .bind(&correlation.pattern_snapshot)
            .bind(correlation.first_seen.timestamp_millis())
            .bind(correlation.last_seen.timestamp_millis())
            .bind(i64::from(correlation.observation_count))
            .bind(&correlation.inferred_country)
            .bind(&correlation.inferred_region)
            .bind(correlation.confidence)
            .bind(correlation.similarity_score)
            .bind(i64::from(correlation.matching_asn_count))
            .bind(correlation.average_deviation_ms)
            .bind(correlation.vpn_flag)
            .bind(&correlation.vpn_true_location)
            .fetch_one(&self.pool)
            .await?;
            correlation_from_row(&row)
        }
    }

    fn update(
        &self,
        correlation: &Correlation,
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send {
        async move {
            let id = correlation.id.ok_or_else(|| DatabaseError::InvalidColumn {
                column: "id",
                value: "cluster was never stored".to_string(),
            })?;

            let result = sqlx::query(
                "UPDATE correlations SET
                    signature = ?, pattern_snapshot = ?, last_seen_ms = ?,
                    observation_count = MAX(observation_count, ?),
                    inferred_country = ?, inferred_region = ?, confidence = ?,
                    similarity_score = ?, matching_asn_count = ?, average_deviation_ms = ?,
                    vpn_flag = ?, vpn_true_location = ?
                 WHERE id = ?",
            )
            .bind(correlation.signature.as_str())
            .bind(&correlation.pattern_snapshot)
            .bind(correlation.last_seen.timestamp_millis())
            .bind(i64::from(correlation.observation_count))
            .bind(&correlation.inferred_country)
            .bind(&correlation.inferred_region)
            .bind(correlation.confidence)
            .bind(correlation.similarity_score)
            .bind(i64::from(correlation.matching_asn_count))
            .bind(correlation.average_deviation_ms)
            .bind(correlation.vpn_flag)
            .bind(&correlation.vpn_true_location)
            .bind(id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DatabaseError::SqlError(sqlx::Error::RowNotFound));
            }
            Ok(())
        }
    }
}

fn correlation_from_row(row: &SqliteRow) -> Result<Correlation, DatabaseError> {
    Ok(Correlation {
        id: Some(row.try_get("id")?),
        visitor_id: row.try_get("visitor_id")?,
        signature: PatternSignature::from_stored(row.try_get("signature")?),
        pattern_snapshot: row.try_get("pattern_snapshot")?,
        first_seen: millis_to_datetime("first_seen_ms", row.try_get("first_seen_ms")?)?,
        last_seen: millis_to_datetime("last_seen_ms", row.try_get("last_seen_ms")?)?,
        observation_count: to_u32("observation_count", row.try_get("observation_count")?)?,
        inferred_country: row.try_get("inferred_country")?,
        inferred_region: row.try_get("inferred_region")?,
        confidence: row.try_get("confidence")?,
        similarity_score: row.try_get("similarity_score")?,
        matching_asn_count: to_u32("matching_asn_count", row.try_get("matching_asn_count")?)?,
        average_deviation_ms: row.try_get("average_deviation_ms")?,
        vpn_flag: row.try_get("vpn_flag")?,
        vpn_true_location: row.try_get("vpn_true_location")?,
    })
}

fn millis_to_datetime(column: &'static str, ms: i64) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| DatabaseError::InvalidColumn {
        column,
        value: ms.to_string(),
    })
}

fn to_u32(column: &'static str, value: i64) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| DatabaseError::InvalidColumn {
        column,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::test_support::probe;
    use crate::pattern::{build_pattern, Pattern};
    use crate::storage::test_helpers::create_test_pool;
    use chrono::{Duration, TimeZone};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 9, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    fn sample_pattern(slow_ms: f64) -> Pattern {
        build_pattern(&[probe(64512, 10.0, Some("NL")), probe(64513, slow_ms, Some("DE"))])
    }

    fn new_cluster(visitor: &str, pattern: &Pattern, seen: DateTime<Utc>) -> Correlation {
        Correlation::new_cluster(visitor, pattern, PatternSignature::of(pattern), seen)
            .expect("cluster builds")
    }

    #[tokio::test]
    async fn test_insert_and_find_by_signature() {
        let repo = SqliteCorrelationRepository::new(create_test_pool().await);
        let pattern = sample_pattern(20.0);
        let mut cluster = new_cluster("visitor-a", &pattern, at(0));
        cluster.inferred_country = Some("NL".to_string());
        cluster.confidence = 0.4;

        let stored = repo.insert(&cluster).await.expect("insert succeeds");
        assert!(stored.id.is_some());

        let found = repo
            .find_by_signature("visitor-a", &cluster.signature)
            .await
            .expect("query succeeds")
            .expect("cluster exists");
        assert_eq!(found, stored);
        assert_eq!(found.first_seen, at(0));
        assert_eq!(found.inferred_country.as_deref(), Some("NL"));

        // Clusters are visitor-scoped
        let other = repo
            .find_by_signature("visitor-b", &cluster.signature)
            .await
            .expect("query succeeds");
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_list_is_most_recent_first() {
        let repo = SqliteCorrelationRepository::new(create_test_pool().await);
        for (slow_ms, minute) in [(20.0, 5), (40.0, 30), (80.0, 10)] {
            let pattern = sample_pattern(slow_ms);
            repo.insert(&new_cluster("visitor-a", &pattern, at(minute)))
                .await
                .expect("insert succeeds");
        }

        let listed = repo
            .list_for_visitor("visitor-a")
            .await
            .expect("query succeeds");
        let seen: Vec<_> = listed.iter().map(|c| c.last_seen).collect();
        assert_eq!(seen, vec![at(30), at(10), at(5)]);

        let latest = repo
            .latest_for_visitor("visitor-a")
            .await
            .expect("query succeeds")
            .expect("visitor has clusters");
        assert_eq!(latest.last_seen, at(30));
        assert!(repo
            .latest_for_visitor("nobody")
            .await
            .expect("query succeeds")
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_merges_into_existing_row() {
        let repo = SqliteCorrelationRepository::new(create_test_pool().await);
        let pattern = sample_pattern(20.0);
        let first = repo
            .insert(&new_cluster("visitor-a", &pattern, at(0)))
            .await
            .expect("insert succeeds");
        let second = repo
            .insert(&new_cluster("visitor-a", &pattern, at(7)))
            .await
            .expect("conflicting insert upserts");

        assert_eq!(first.id, second.id);
        assert_eq!(second.observation_count, 2);
        assert_eq!(second.first_seen, at(0));
        assert_eq!(second.last_seen, at(7));
        assert_eq!(
            repo.list_for_visitor("visitor-a")
                .await
                .expect("query succeeds")
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_writes_back_changes() {
        let repo = SqliteCorrelationRepository::new(create_test_pool().await);
        let pattern = sample_pattern(20.0);
        let mut stored = repo
            .insert(&new_cluster("visitor-a", &pattern, at(0)))
            .await
            .expect("insert succeeds");

        let drifted = sample_pattern(21.0);
        stored.pattern_snapshot = drifted.to_snapshot().expect("serializes");
        stored.signature = PatternSignature::of(&drifted);
        stored.last_seen = at(0) + Duration::minutes(3);
        stored.observation_count = 2;
        stored.vpn_flag = true;
        stored.vpn_true_location = Some("NL".to_string());
        stored.average_deviation_ms = 0.5;
        repo.update(&stored).await.expect("update succeeds");

        let reloaded = repo
            .find_by_signature("visitor-a", &PatternSignature::of(&drifted))
            .await
            .expect("query succeeds")
            .expect("cluster moved to new signature");
        assert_eq!(reloaded, stored);
    }

    #[tokio::test]
    async fn test_update_without_id_fails() {
        let repo = SqliteCorrelationRepository::new(create_test_pool().await);
        let cluster = new_cluster("visitor-a", &sample_pattern(20.0), at(0));
        let result = repo.update(&cluster).await;
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidColumn { column: "id", .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupted_timestamp_is_reported() {
        let pool = create_test_pool().await;
        let repo = SqliteCorrelationRepository::new(pool.clone());
        let cluster = new_cluster("visitor-a", &sample_pattern(20.0), at(0));
        repo.insert(&cluster).await.expect("insert succeeds");

        sqlx::query("UPDATE correlations SET last_seen_ms = ?")
            .bind(i64::MAX)
            .execute(&pool)
            .await
            .expect("raw update");

        let result = repo.list_for_visitor("visitor-a").await;
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidColumn {
                column: "last_seen_ms",
                ..
            })
        ));
    }
}
