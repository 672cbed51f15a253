//! Database operations.
//!
//! SQLite holds two tables: `visits` (one row per visit, with the inference
//! result written back after the engine runs) and `correlations` (the
//! visitor-scoped clusters behind [`CorrelationRepository`]).

pub mod correlation;
pub mod migrations;
pub mod pool;
#[cfg(test)]
pub(crate) mod test_helpers;
pub mod visit;

// Re-export commonly used items
pub use correlation::{CorrelationRepository, SqliteCorrelationRepository};
pub use migrations::run_migrations;
pub use pool::init_db_pool_with_path;
pub use visit::{insert_visit, query_visit_regions, record_visit_inference, VisitRegionRow};
