//! Schema migrations.

use log::debug;
use sqlx::migrate::Migrator;
use sqlx::SqlitePool;

use crate::error_handling::DatabaseError;

/// Applies the `migrations/` directory shipped with the crate.
///
/// Already-applied migrations are skipped, so calling this on every start is safe.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DatabaseError> {
    let migrations_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let migrator = Migrator::new(migrations_dir.as_path()).await?;
    migrator.run(pool).await?;
    debug!("Schema at migration {}", migrator.iter().count());
    Ok(())
}
