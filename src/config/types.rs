//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing
//! and configuration of the inference engine.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::constants::{
    DB_PATH, DEFAULT_ASN_WEIGHT, DEFAULT_CLOSEST_PROBE_COUNT, DEFAULT_DEVIATION_WEIGHT,
    DEFAULT_MODEL_TIMEOUT, DEFAULT_MODEL_WORKERS, DEFAULT_SIMILARITY_THRESHOLD,
    DEFAULT_TIMEZONE_TOLERANCE_HOURS,
};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Command-line options and configuration.
///
/// Every tuning value can also come from the environment (or a `.env` file),
/// which is how the service deployment sets them.
///
/// # Examples
///
/// ```bash
/// # Process a visit export with the built-in region catalog
/// latency_region visits.ndjson
///
/// # With a trained model and a stricter match threshold
/// latency_region visits.ndjson --model Models/inferred_region.onnx \
///     --model-metadata Models/inferred_region-metadata.json --similarity-threshold 0.8
/// ```
#[derive(Debug, Clone, Parser)]
#[command(
    name = "latency_region",
    about = "Correlates visitor latency fingerprints and infers a metro-level region."
)]
pub struct Config {
    /// NDJSON file of visit records to process ("-" reads stdin)
    #[arg(value_parser)]
    pub file: PathBuf,

    /// Log level: error|warn|info|debug|trace
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Log format: plain|json
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Database path (SQLite file)
    #[arg(long, value_parser, env = "LATENCY_REGION_DB_PATH", default_value = DB_PATH)]
    pub db_path: PathBuf,

    /// Region catalog JSON file (built-in ten-metro catalog when omitted)
    #[arg(long, env = "LATENCY_REGION_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Trained region model (ONNX)
    #[arg(long, env = "LATENCY_REGION_MODEL")]
    pub model: Option<PathBuf>,

    /// Metadata document shipped with the trained model
    #[arg(long, env = "LATENCY_REGION_MODEL_METADATA")]
    pub model_metadata: Option<PathBuf>,

    /// Maximum visits processed concurrently
    #[arg(long, default_value_t = 16)]
    pub max_concurrency: usize,

    /// Similarity a cluster must exceed to absorb a new pattern
    #[arg(long, env = "LATENCY_REGION_SIMILARITY_THRESHOLD", default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
    pub similarity_threshold: f64,

    /// Weight of the ASN overlap ratio in the similarity score
    #[arg(long, default_value_t = DEFAULT_ASN_WEIGHT)]
    pub asn_weight: f64,

    /// Weight of the timing deviation score in the similarity score
    #[arg(long, default_value_t = DEFAULT_DEVIATION_WEIGHT)]
    pub deviation_weight: f64,

    /// Number of closest networks used for the country vote
    #[arg(long, default_value_t = DEFAULT_CLOSEST_PROBE_COUNT)]
    pub closest_probe_count: usize,

    /// Timezone mismatch tolerance in hours
    #[arg(long, default_value_t = DEFAULT_TIMEZONE_TOLERANCE_HOURS)]
    pub timezone_tolerance_hours: f64,

    /// Learned-model inference timeout in milliseconds
    #[arg(long, env = "LATENCY_REGION_MODEL_TIMEOUT_MS", default_value_t = DEFAULT_MODEL_TIMEOUT.as_millis() as u64)]
    pub model_timeout_ms: u64,

    /// Blocking worker threads reserved for model inference
    #[arg(long, default_value_t = DEFAULT_MODEL_WORKERS)]
    pub model_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file: PathBuf::from("visits.ndjson"),
            log_level: LogLevel::Info,
            log_format: LogFormat::Plain,
            db_path: PathBuf::from(DB_PATH),
            catalog: None,
            model: None,
            model_metadata: None,
            max_concurrency: 16,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            asn_weight: DEFAULT_ASN_WEIGHT,
            deviation_weight: DEFAULT_DEVIATION_WEIGHT,
            closest_probe_count: DEFAULT_CLOSEST_PROBE_COUNT,
            timezone_tolerance_hours: DEFAULT_TIMEZONE_TOLERANCE_HOURS,
            model_timeout_ms: DEFAULT_MODEL_TIMEOUT.as_millis() as u64,
            model_workers: DEFAULT_MODEL_WORKERS,
        }
    }
}

/// Engine tuning (no CLI dependencies).
///
/// This is what the library components consume; it can be built
/// programmatically or derived from [`Config`].
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Weight of the ASN overlap ratio
    pub asn_weight: f64,
    /// Weight of the timing deviation score
    pub deviation_weight: f64,
    /// A cluster matches when similarity is strictly above this
    pub similarity_threshold: f64,
    /// Networks considered by the location vote
    pub closest_probe_count: usize,
    /// Timezone mismatch tolerance in hours
    pub timezone_tolerance_hours: f64,
    /// Learned-model inference budget
    pub model_timeout: Duration,
    /// Permits of the model worker pool
    pub model_workers: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            asn_weight: DEFAULT_ASN_WEIGHT,
            deviation_weight: DEFAULT_DEVIATION_WEIGHT,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            closest_probe_count: DEFAULT_CLOSEST_PROBE_COUNT,
            timezone_tolerance_hours: DEFAULT_TIMEZONE_TOLERANCE_HOURS,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            model_workers: DEFAULT_MODEL_WORKERS,
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            asn_weight: config.asn_weight,
            deviation_weight: config.deviation_weight,
            similarity_threshold: config.similarity_threshold,
            // A zero-sized vote window would make every confidence undefined
            closest_probe_count: config.closest_probe_count.max(1),
            timezone_tolerance_hours: config.timezone_tolerance_hours,
            model_timeout: Duration::from_millis(config.model_timeout_ms),
            model_workers: config.model_workers.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(
            log::LevelFilter::from(LogLevel::Error),
            log::LevelFilter::Error
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Warn),
            log::LevelFilter::Warn
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Info),
            log::LevelFilter::Info
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Debug),
            log::LevelFilter::Debug
        );
        assert_eq!(
            log::LevelFilter::from(LogLevel::Trace),
            log::LevelFilter::Trace
        );
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_concurrency, 16);
        assert_eq!(config.similarity_threshold, 0.7);
        assert_eq!(config.asn_weight, 0.6);
        assert_eq!(config.deviation_weight, 0.4);
        assert_eq!(config.closest_probe_count, 5);
        assert!(config.model.is_none());
        assert_eq!(config.db_path, PathBuf::from("./latency_region.db"));
    }

    #[test]
    fn test_engine_settings_from_config() {
        let config = Config {
            similarity_threshold: 0.8,
            closest_probe_count: 0,
            model_timeout_ms: 50,
            model_workers: 0,
            ..Default::default()
        };
        let settings = EngineSettings::from(&config);
        assert_eq!(settings.similarity_threshold, 0.8);
        // Zero values are clamped to a usable minimum
        assert_eq!(settings.closest_probe_count, 1);
        assert_eq!(settings.model_workers, 1);
        assert_eq!(settings.model_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_engine_settings_default_matches_config_default() {
        let from_config = EngineSettings::from(&Config::default());
        assert_eq!(from_config, EngineSettings::default());
    }

    #[test]
    fn test_cli_parsing_overrides() {
        let config = Config::try_parse_from([
            "latency_region",
            "visits.ndjson",
            "--similarity-threshold",
            "0.75",
            "--log-format",
            "json",
        ])
        .expect("CLI arguments should parse");
        assert_eq!(config.file, PathBuf::from("visits.ndjson"));
        assert_eq!(config.similarity_threshold, 0.75);
        assert!(matches!(config.log_format, LogFormat::Json));
    }
}
