//! Command-line entry point.
//!
//! Parses the CLI, loads tuning values from an env file, runs the batch and
//! prints a one-line summary. Everything else lives in the library.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::debug;

use latency_region::initialization::init_logger_with;
use latency_region::{run_inference, Config, RunReport};

/// Names an env file to load instead of `./.env`.
const ENV_FILE_VAR: &str = "LATENCY_REGION_ENV_FILE";

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = load_env_file();

    let config = Config::parse();
    init_logger_with(config.log_level.clone().into(), config.log_format.clone())
        .context("Failed to initialize logger")?;
    match &env_file {
        Some(path) => debug!("Loaded settings from {}", path.display()),
        None => debug!("No env file loaded; using CLI flags and the environment"),
    }

    match run_inference(config).await {
        Ok(report) => {
            println!("{}", summary(&report));
            println!("Results saved in {}", report.db_path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("latency_region error: {e:#}");
            process::exit(1);
        }
    }
}

/// Loads the env file named by `LATENCY_REGION_ENV_FILE`, or `.env` from the
/// working directory or its parents. Variables already set win.
fn load_env_file() -> Option<PathBuf> {
    match std::env::var_os(ENV_FILE_VAR) {
        Some(path) => {
            let path = PathBuf::from(path);
            dotenvy::from_path(&path).ok().map(|()| path)
        }
        None => dotenvy::dotenv().ok(),
    }
}

fn summary(report: &RunReport) -> String {
    format!(
        "✅ Processed {} visit{} ({} with a region, {} rejected) in {:.1}s using {}",
        report.processed,
        if report.processed == 1 { "" } else { "s" },
        report.with_region,
        report.rejected,
        report.elapsed_seconds,
        report.strategies.join(" -> ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use latency_region::StatsSnapshot;

    fn report(processed: usize) -> RunReport {
        RunReport {
            total_lines: processed + 1,
            processed,
            with_region: processed,
            rejected: 1,
            strategies: vec!["learned", "heuristic"],
            stats: StatsSnapshot::default(),
            db_path: PathBuf::from("latency_region.db"),
            elapsed_seconds: 2.04,
        }
    }

    #[test]
    fn test_summary_pluralizes_and_lists_chain() {
        assert_eq!(
            summary(&report(1)),
            "✅ Processed 1 visit (1 with a region, 1 rejected) in 2.0s using learned -> heuristic"
        );
        assert!(summary(&report(3)).starts_with("✅ Processed 3 visits"));
    }
}
