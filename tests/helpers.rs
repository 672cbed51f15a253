// Shared test helpers for database setup and visit records.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::io::Write;
use tempfile::NamedTempFile;

use latency_region::run_migrations;

/// Creates a test database pool with migrations applied.
/// Uses a single-connection in-memory database for fast test execution.
#[allow(dead_code)] // Used by other test files
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// A successful probe as the collector sends it.
#[allow(dead_code)]
pub fn probe(asn_id: u32, average_ms: f64, country: &str, region: Option<&str>) -> Value {
    json!({
        "asnId": asn_id,
        "asnName": format!("AS{asn_id}"),
        "countryHint": country,
        "regionHint": region,
        "target": format!("probe-{asn_id}.example"),
        "success": true,
        "averageMs": average_ms,
        "minMs": average_ms * 0.9,
        "maxMs": average_ms * 1.1,
        "jitterMs": 1.0,
        "attempts": 3,
        "successfulAttempts": 3
    })
}

/// A probe whose every attempt failed.
#[allow(dead_code)]
pub fn failed_probe(asn_id: u32) -> Value {
    json!({
        "asnId": asn_id,
        "asnName": format!("AS{asn_id}"),
        "target": format!("probe-{asn_id}.example"),
        "success": false,
        "attempts": 3,
        "successfulAttempts": 0
    })
}

/// Probes of a visitor sitting near Chicago.
#[allow(dead_code)]
pub fn chicago_probes() -> Vec<Value> {
    vec![
        probe(7922, 10.0, "US", Some("Chicago")),
        probe(3356, 20.0, "US", Some("Chicago")),
        probe(3320, 40.0, "DE", None),
    ]
}

/// One visit record with US browser signals.
#[allow(dead_code)]
pub fn visit_record(visit_id: &str, visitor_id: &str, minute: u32, probes: Vec<Value>) -> Value {
    json!({
        "visitId": visit_id,
        "visitorId": visitor_id,
        "timestamp": format!("2024-04-02T10:{minute:02}:00Z"),
        "timezoneOffsetMinutes": -300,
        "locale": "en-US",
        "geoipCountry": "US",
        "probes": probes
    })
}

/// Writes lines to a temporary NDJSON file.
#[allow(dead_code)]
pub fn write_ndjson(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    for line in lines {
        writeln!(file, "{}", line).expect("Failed to write line");
    }
    file.flush().expect("Failed to flush file");
    file
}
