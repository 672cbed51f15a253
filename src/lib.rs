//! latency_region library: visitor latency correlation and metro-region inference
//!
//! Each visit carries ping-latency probes against a fixed set of networks. This
//! library turns those probes into a normalized latency fingerprint, correlates
//! the fingerprint with the visitor's earlier ones, votes on a country from the
//! closest networks, and assigns a metro region with a confidence, falling
//! back from a learned model to a heuristic.
//!
//! # Example
//!
//! ```no_run
//! use latency_region::{run_inference, Config};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     file: std::path::PathBuf::from("visits.ndjson"),
//!     max_concurrency: 32,
//!     ..Default::default()
//! };
//!
//! let report = run_inference(config).await?;
//! println!("{} visits, {} with a region", report.processed, report.with_region);
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

mod app;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod correlation;
pub mod engine;
pub mod error_handling;
pub mod initialization;
pub mod mismatch;
pub mod pattern;
pub mod probe;
pub mod storage;

// Re-export public API
pub use catalog::{load_catalog, GeoPoint, Region, RegionCatalog};
pub use classifier::{
    Classification, ClassificationContext, CompositeClassifier, HeuristicClassifier,
    LearnedClassifier, RegionCandidate, RegionClassifier,
};
pub use config::{Config, EngineSettings, LogFormat, LogLevel};
pub use engine::{InferenceEngine, InferenceResult};
pub use error_handling::{ProcessingStats, StatsSnapshot};
pub use probe::{parse_visit_line, ProbeResult, Visit, VpnSignal};
pub use run::{run_inference, RunReport};
pub use storage::{query_visit_regions, run_migrations, SqliteCorrelationRepository};

// Internal run module (contains the batch processing loop)
mod run {
    use anyhow::{Context, Result};
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use futures::stream::FuturesUnordered;
    use futures::StreamExt;
    use log::{error, info, warn};
    use sqlx::SqlitePool;
    use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

    use crate::app::{log_progress, print_final_statistics, RunCounters};
    use crate::catalog::{load_catalog, RegionCatalog};
    use crate::classifier::{
        CompositeClassifier, HeuristicClassifier, LearnedClassifier, RegionClassifier,
    };
    use crate::config::{
        Config, EngineSettings, DEFAULT_MODEL_FILE, DEFAULT_MODEL_METADATA_FILE,
        LOGGING_INTERVAL,
    };
    use crate::engine::InferenceEngine;
    use crate::error_handling::{ErrorType, ProcessingStats, StatsSnapshot};
    use crate::probe::parse_visit_line;
    use crate::storage::{
        init_db_pool_with_path, insert_visit, record_visit_inference, run_migrations,
        SqliteCorrelationRepository,
    };

    type Engine = InferenceEngine<SqliteCorrelationRepository>;

    /// Results of a visit processing run.
    #[derive(Debug, Clone)]
    pub struct RunReport {
        /// Non-blank lines read from the input
        pub total_lines: usize,
        /// Visits that went through the engine
        pub processed: usize,
        /// Visits that received a region
        pub with_region: usize,
        /// Lines rejected at parsing or visits that could not be stored
        pub rejected: usize,
        /// Strategies of the classification chain, in fallback order
        pub strategies: Vec<&'static str>,
        /// Contained failures and notable events of the run
        pub stats: StatsSnapshot,
        /// Path to the SQLite database containing results
        pub db_path: PathBuf,
        /// Elapsed time in seconds
        pub elapsed_seconds: f64,
    }

    /// Processes an NDJSON file of visits with the provided configuration.
    ///
    /// Every visit is stored, run through the inference engine, and its region
    /// columns are written back. A line that is not a valid visit record is
    /// counted and skipped; it never stops the run.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The input file cannot be opened
    /// - Database initialization or migrations fail
    /// - The region catalog file cannot be loaded
    pub async fn run_inference(config: Config) -> Result<RunReport> {
        let settings = EngineSettings::from(&config);

        let pool = init_db_pool_with_path(&config.db_path)
            .await
            .context("Failed to initialize database pool")?;
        run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        let catalog = Arc::new(
            load_catalog(config.catalog.as_deref())
                .await
                .context("Failed to load region catalog")?,
        );
        info!("Region catalog: {} regions", catalog.len());

        let stats = Arc::new(ProcessingStats::new());
        let classifier = build_classifier(&config, &catalog, &settings, &stats).await;
        let strategies = classifier.strategy_names();
        info!("Classification chain: {}", strategies.join(" -> "));

        let engine = Arc::new(InferenceEngine::new(
            SqliteCorrelationRepository::new(pool.clone()),
            Arc::clone(&catalog),
            classifier,
            &settings,
            Arc::clone(&stats),
        ));

        let reader: Box<dyn AsyncBufRead + Unpin + Send> = if config.file.as_os_str() == "-" {
            info!("Reading visits from stdin");
            Box::new(BufReader::new(tokio::io::stdin()))
        } else {
            let file = tokio::fs::File::open(&config.file)
                .await
                .with_context(|| format!("Failed to open input file {}", config.file.display()))?;
            Box::new(BufReader::new(file))
        };
        let mut lines = reader.lines();

        let max_concurrency = config.max_concurrency.max(1);
        let counters = Arc::new(RunCounters::new());
        let start_time = std::time::Instant::now();
        let mut tasks = FuturesUnordered::new();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read line from input: {e}");
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }
            counters.read.fetch_add(1, Ordering::SeqCst);

            while tasks.len() >= max_concurrency {
                drain_one(&mut tasks, &counters).await;
            }

            let pool = pool.clone();
            let engine = Arc::clone(&engine);
            let counters_for_task = Arc::clone(&counters);
            tasks.push(tokio::spawn(async move {
                process_line(&line, &pool, &engine, &counters_for_task).await;
                let processed = counters_for_task.processed.load(Ordering::SeqCst);
                if processed > 0 && processed % LOGGING_INTERVAL == 0 {
                    log_progress(start_time, &counters_for_task.processed);
                }
            }));
        }

        while !tasks.is_empty() {
            drain_one(&mut tasks, &counters).await;
        }

        let elapsed_seconds = start_time.elapsed().as_secs_f64();
        print_final_statistics(&counters, &stats, elapsed_seconds);
        pool.close().await;

        let (total_lines, processed, with_region, rejected) = counters.snapshot();
        Ok(RunReport {
            total_lines,
            processed,
            with_region,
            rejected,
            strategies,
            stats: stats.snapshot(),
            db_path: config.db_path,
            elapsed_seconds,
        })
    }

    async fn drain_one(
        tasks: &mut FuturesUnordered<tokio::task::JoinHandle<()>>,
        counters: &RunCounters,
    ) {
        if let Some(Err(join_error)) = tasks.next().await {
            counters.rejected.fetch_add(1, Ordering::SeqCst);
            warn!("Visit task panicked: {:?}", join_error);
        }
    }

    /// Learned model first (when it loads), heuristic last.
    async fn build_classifier(
        config: &Config,
        catalog: &Arc<RegionCatalog>,
        settings: &EngineSettings,
        stats: &ProcessingStats,
    ) -> CompositeClassifier {
        let mut strategies: Vec<Arc<dyn RegionClassifier>> = Vec::with_capacity(2);

        let model_path = config
            .model
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_FILE));
        let metadata_path = config
            .model_metadata
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_METADATA_FILE));

        match LearnedClassifier::load(&model_path, &metadata_path, catalog).await {
            Ok(learned) => strategies.push(Arc::new(learned)),
            Err(e) => {
                warn!("Learned region model unavailable, using the heuristic only: {e}");
                stats.increment_error(e.error_type());
            }
        }

        strategies.push(Arc::new(HeuristicClassifier::new(Arc::clone(catalog))));
        CompositeClassifier::new(strategies, settings)
    }

    async fn process_line(line: &str, pool: &SqlitePool, engine: &Engine, counters: &RunCounters) {
        let stats = engine.stats();

        let visit = match parse_visit_line(line) {
            Ok(visit) => visit,
            Err(e) => {
                warn!("Skipping visit record: {e}");
                stats.increment_error(ErrorType::InvalidVisitRecord);
                counters.rejected.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        if let Err(e) = insert_visit(pool, &visit).await {
            error!(
                "visitor={} visit={}: failed to store visit: {e}",
                visit.visitor_id, visit.visit_id
            );
            stats.increment_error(ErrorType::VisitWriteError);
            counters.rejected.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let result = engine.process_visit(&visit).await;
        counters.processed.fetch_add(1, Ordering::SeqCst);
        if result.is_some() {
            counters.with_region.fetch_add(1, Ordering::SeqCst);
        }

        if let Err(e) = record_visit_inference(pool, &visit.visit_id, result.as_ref()).await {
            error!(
                "visitor={} visit={}: failed to record region inference: {e}",
                visit.visitor_id, visit.visit_id
            );
            stats.increment_error(ErrorType::VisitWriteError);
        }
    }
}
