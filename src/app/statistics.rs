//! Statistics printing.

use log::info;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use crate::error_handling::{ErrorType, InfoType, ProcessingStats};

/// Visit counters of one run, shared by the processing tasks.
#[derive(Debug, Default)]
pub struct RunCounters {
    /// Non-blank lines read from the input
    pub read: AtomicUsize,
    /// Visits that went through the engine
    pub processed: AtomicUsize,
    /// Visits that received a region
    pub with_region: AtomicUsize,
    /// Lines rejected or visits that could not be stored
    pub rejected: AtomicUsize,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> (usize, usize, usize, usize) {
        (
            self.read.load(Ordering::SeqCst),
            self.processed.load(Ordering::SeqCst),
            self.with_region.load(Ordering::SeqCst),
            self.rejected.load(Ordering::SeqCst),
        )
    }
}

/// Prints the counters and the one-line summary at the end of a run.
pub fn print_final_statistics(
    counters: &RunCounters,
    stats: &ProcessingStats,
    elapsed_seconds: f64,
) {
    let (read, processed, with_region, rejected) = counters.snapshot();
    info!(
        "Run statistics: read={}, processed={}, with_region={}, rejected={}",
        read, processed, with_region, rejected
    );

    print_error_statistics(stats);

    info!(
        "{}",
        summary_line(processed, with_region, rejected, elapsed_seconds)
    );
}

fn summary_line(processed: usize, with_region: usize, rejected: usize, elapsed: f64) -> String {
    format!(
        "✅ Processed {} visit{} ({} with a region, {} rejected) in {:.1}s - see database for details",
        processed,
        if processed == 1 { "" } else { "s" },
        with_region,
        rejected,
        elapsed
    )
}

/// Prints error and info statistics to the log.
pub fn print_error_statistics(stats: &ProcessingStats) {
    let total_errors = stats.total_errors();
    let total_info = stats.total_info();

    if total_errors > 0 {
        info!("Error Counts ({} total):", total_errors);
        for error_type in ErrorType::iter() {
            let count = stats.get_error_count(error_type);
            if count > 0 {
                info!("   {}: {}", error_type.as_str(), count);
            }
        }
    }

    if total_info > 0 {
        info!("Info Counts ({} total):", total_info);
        for info_type in InfoType::iter() {
            let count = stats.get_info_count(info_type);
            if count > 0 {
                info!("   {}: {}", info_type.as_str(), count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line_pluralizes() {
        assert_eq!(
            summary_line(1, 1, 0, 0.04),
            "✅ Processed 1 visit (1 with a region, 0 rejected) in 0.0s - see database for details"
        );
        assert!(summary_line(3, 2, 1, 1.3).starts_with("✅ Processed 3 visits (2 with a region, 1 rejected) in 1.3s"));
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = RunCounters::new();
        counters.read.fetch_add(3, Ordering::SeqCst);
        counters.processed.fetch_add(2, Ordering::SeqCst);
        counters.rejected.fetch_add(1, Ordering::SeqCst);
        assert_eq!(counters.snapshot(), (3, 2, 0, 1));
    }

    #[test]
    fn test_print_error_statistics_no_counts() {
        let stats = ProcessingStats::new();
        // Should not panic when nothing was counted
        print_error_statistics(&stats);
    }

    #[test]
    fn test_print_final_statistics_all_types() {
        let stats = ProcessingStats::new();
        stats.increment_error(ErrorType::ModelUnavailable);
        stats.increment_info(InfoType::NewCluster);
        stats.increment_info(InfoType::HeuristicClassification);
        print_final_statistics(&RunCounters::new(), &stats, 0.5);
    }
}
