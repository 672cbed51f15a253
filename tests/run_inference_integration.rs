//! Integration tests for run_inference
//!
//! These tests drive a whole run from an NDJSON file into a temporary
//! database and check what ends up stored.

mod helpers;

use helpers::{chicago_probes, failed_probe, visit_record, write_ndjson};
use latency_region::storage::init_db_pool_with_path;
use latency_region::{query_visit_regions, run_inference, Config, LogFormat, LogLevel};
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

fn create_test_config(input_file: PathBuf, db_path: PathBuf, max_concurrency: usize) -> Config {
    Config {
        file: input_file,
        log_level: LogLevel::Error,
        log_format: LogFormat::Plain,
        db_path,
        model: Some(PathBuf::from("does-not-exist/inferred_region.onnx")),
        model_metadata: Some(PathBuf::from(
            "does-not-exist/inferred_region-metadata.json",
        )),
        max_concurrency,
        ..Default::default()
    }
}

fn mixed_input() -> Vec<String> {
    let tokyo = json!({
        "visitId": "visit-4",
        "visitorId": "visitor-c",
        "timestamp": "2024-04-02T10:07:00Z",
        "timezoneOffsetMinutes": 540,
        "locale": "ja-JP",
        "probes": [failed_probe(2516), failed_probe(4713)]
    });
    vec![
        visit_record("visit-1", "visitor-a", 0, chicago_probes()).to_string(),
        visit_record("visit-2", "visitor-a", 5, chicago_probes()).to_string(),
        "not json".to_string(),
        String::new(),
        json!({"visitId": "visit-3", "timestamp": "2024-04-02T10:06:00Z", "probes": []})
            .to_string(),
        tokyo.to_string(),
    ]
}

#[tokio::test]
async fn test_run_inference_processes_and_stores_visits() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("regions.db");
    let input = write_ndjson(&mixed_input());

    let report = run_inference(create_test_config(
        input.path().to_path_buf(),
        db_path.clone(),
        4,
    ))
    .await
    .expect("run should succeed");

    assert_eq!(report.total_lines, 5, "blank lines are not counted");
    assert_eq!(report.processed, 3);
    assert_eq!(report.rejected, 2);
    assert_eq!(report.with_region, 3);
    assert_eq!(report.strategies, vec!["heuristic"]);
    assert_eq!(report.db_path, db_path);
    assert_eq!(report.stats.errors.get("Invalid visit record"), Some(&2));
    assert_eq!(report.stats.errors.get("Model unavailable"), Some(&1));
    assert_eq!(report.stats.info.get("Exact cluster match"), Some(&1));
    assert_eq!(report.stats.info.get("No successful probes"), Some(&1));

    let pool = init_db_pool_with_path(&db_path)
        .await
        .expect("database reopens");

    let rows = query_visit_regions(&pool, Some("visitor-a"))
        .await
        .expect("query succeeds");
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.region_id.as_deref(), Some("us-chi"));
        assert_eq!(row.strategy.as_deref(), Some("heuristic"));
        assert!(!row.geoip_mismatch);
    }

    let tokyo = query_visit_regions(&pool, Some("visitor-c"))
        .await
        .expect("query succeeds");
    assert_eq!(tokyo.len(), 1);
    assert_eq!(tokyo[0].region_id.as_deref(), Some("ap-tok"));

    let (clusters, observations): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(observation_count), 0) FROM correlations WHERE visitor_id = 'visitor-a'",
    )
    .fetch_one(&pool)
    .await
    .expect("correlations readable");
    assert_eq!((clusters, observations), (1, 2));

    let empty_pattern_clusters: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM correlations WHERE visitor_id = 'visitor-c'")
            .fetch_one(&pool)
            .await
            .expect("correlations readable");
    assert_eq!(empty_pattern_clusters, 0);
}

#[tokio::test]
async fn test_rerun_is_idempotent_for_visit_rows() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("regions.db");
    let input = write_ndjson(&[visit_record("visit-1", "visitor-a", 0, chicago_probes()).to_string()]);

    for _ in 0..2 {
        run_inference(create_test_config(
            input.path().to_path_buf(),
            db_path.clone(),
            1,
        ))
        .await
        .expect("run should succeed");
    }

    let pool = init_db_pool_with_path(&db_path)
        .await
        .expect("database reopens");
    let rows = query_visit_regions(&pool, None)
        .await
        .expect("query succeeds");
    assert_eq!(rows.len(), 1, "re-delivered visit keeps one row");

    let observations: i64 = sqlx::query_scalar(
        "SELECT observation_count FROM correlations WHERE visitor_id = 'visitor-a'",
    )
    .fetch_one(&pool)
    .await
    .expect("cluster exists");
    assert_eq!(observations, 2, "each delivery is an observation");
}

#[tokio::test]
async fn test_missing_input_file_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let result = run_inference(create_test_config(
        temp_dir.path().join("missing.ndjson"),
        temp_dir.path().join("regions.db"),
        1,
    ))
    .await;
    let err = result.expect_err("missing input must fail the run");
    assert!(format!("{err:#}").contains("Failed to open input file"));
}

#[tokio::test]
async fn test_empty_catalog_leaves_every_visit_unknown() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let catalog_path = temp_dir.path().join("catalog.json");
    std::fs::write(&catalog_path, "[]").expect("catalog written");
    let input = write_ndjson(&[visit_record("visit-1", "visitor-a", 0, chicago_probes()).to_string()]);

    let config = Config {
        catalog: Some(catalog_path),
        ..create_test_config(
            input.path().to_path_buf(),
            temp_dir.path().join("regions.db"),
            1,
        )
    };
    let report = run_inference(config).await.expect("run should succeed");
    assert_eq!(report.processed, 1);
    assert_eq!(report.with_region, 0);
}
