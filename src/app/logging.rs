//! Progress logging utilities.

use log::info;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Logs how many visits have been processed so far and the current rate.
///
/// # Arguments
///
/// * `start_time` - The start time of processing
/// * `processed_visits` - Atomic counter of visits that went through the engine
pub fn log_progress(start_time: std::time::Instant, processed_visits: &AtomicUsize) {
    let elapsed_secs = start_time.elapsed().as_secs_f64();
    let processed = processed_visits.load(Ordering::SeqCst);
    info!(
        "Processed {} visits in {:.2} seconds (~{:.2} visits/sec)",
        processed,
        elapsed_secs,
        rate(processed, elapsed_secs)
    );
}

fn rate(count: usize, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        count as f64 / elapsed_secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_handles_zero_elapsed() {
        assert_eq!(rate(10, 0.0), 0.0);
        assert_eq!(rate(10, 2.0), 5.0);
    }

    #[test]
    fn test_log_progress_does_not_panic() {
        let counter = AtomicUsize::new(42);
        log_progress(std::time::Instant::now(), &counter);
    }
}
