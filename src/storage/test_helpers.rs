//! Shared test helpers for storage and engine tests.
//!
//! This module provides database setup used across the crate's unit tests.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::storage::run_migrations;

/// Creates a test database pool with migrations applied.
/// Uses an in-memory database for fast test execution; a single connection
/// keeps every query on the same in-memory database.
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

/// Creates a file-backed test pool with several connections.
/// Returns the temp dir so it outlives the pool.
pub async fn create_file_test_pool() -> (tempfile::TempDir, SqlitePool) {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let pool = crate::storage::init_db_pool_with_path(&temp_dir.path().join("test.db"))
        .await
        .expect("Failed to create file-backed pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    (temp_dir, pool)
}
