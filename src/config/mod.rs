//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (thresholds, weights, timeouts)
//! - CLI option types and parsing
//! - Engine settings derived from the CLI configuration

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{Config, EngineSettings, LogFormat, LogLevel};
