//! Run-level helpers.
//!
//! This module provides progress logging and end-of-run statistics printing
//! used by [`run_inference`](crate::run_inference).

pub mod logging;
pub mod statistics;

// Re-export public API
pub use logging::log_progress;
pub use statistics::{print_error_statistics, print_final_statistics, RunCounters};
