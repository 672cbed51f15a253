//! Error handling and processing statistics.
//!
//! This module provides:
//! - Error type definitions for initialization, storage, input, catalog and model failures
//! - Processing statistics tracking (contained failures and info metrics)
//!
//! Counted types are categorized into:
//! - **Errors**: Failures the engine contained without failing the visit
//! - **Info**: Informational metrics (cluster matches, answering strategy, etc.)

mod stats;
mod types;

// Re-export public API
pub use stats::{ProcessingStats, StatsSnapshot};
pub use types::{
    CatalogError, DatabaseError, EngineError, ErrorType, InfoType, InitializationError,
    InputError, ModelError, SnapshotError,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strum::IntoEnumIterator;

    #[test]
    fn test_processing_stats_initialization() {
        let stats = ProcessingStats::new();
        for error_type in ErrorType::iter() {
            assert_eq!(stats.get_error_count(error_type), 0);
        }
        for info_type in InfoType::iter() {
            assert_eq!(stats.get_info_count(info_type), 0);
        }
    }

    #[test]
    fn test_processing_stats_increment() {
        let stats = ProcessingStats::new();
        stats.increment_error(ErrorType::ModelTimeout);
        assert_eq!(stats.get_error_count(ErrorType::ModelTimeout), 1);

        stats.increment_info(InfoType::NewCluster);
        stats.increment_info(InfoType::NewCluster);
        assert_eq!(stats.get_info_count(InfoType::NewCluster), 2);
    }

    #[test]
    fn test_processing_stats_totals() {
        let stats = ProcessingStats::new();
        stats.increment_error(ErrorType::ModelUnavailable);
        stats.increment_error(ErrorType::StoreUnavailable);
        stats.increment_info(InfoType::HeuristicClassification);

        assert_eq!(stats.total_errors(), 2);
        assert_eq!(stats.total_info(), 1);
    }

    #[test]
    fn test_processing_stats_concurrent_increments() {
        let stats = Arc::new(ProcessingStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.increment_info(InfoType::FuzzyClusterMatch);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread should not panic");
        }
        assert_eq!(stats.get_info_count(InfoType::FuzzyClusterMatch), 800);
    }
}
