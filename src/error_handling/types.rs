//! Error type definitions.
//!
//! This module defines all error, failure and info types used throughout the application.

use log::SetLoggerError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),
}

/// Error types for database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error creating the database file.
    #[error("Database file creation error: {0}")]
    FileCreationError(String),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// A stored JSON column could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A schema migration could not be applied.
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// A stored column holds a value outside its domain.
    #[error("Invalid stored value in `{column}`: {value}")]
    InvalidColumn { column: &'static str, value: String },
}

/// Rejection of a visit record at the ingestion boundary.
#[derive(Error, Debug)]
pub enum InputError {
    /// The line is not valid JSON for a visit record.
    #[error("Malformed visit record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required field is absent.
    #[error("Missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but unusable.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

/// A stored cluster snapshot that cannot be used for matching.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot is not a valid pattern: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Snapshot pattern has no entries")]
    Empty,

    #[error("Snapshot pattern is not ordered by normalized time")]
    Unordered,
}

/// Error types for region catalog loading.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read region catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse region catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate region id `{0}` in catalog")]
    DuplicateRegion(String),
}

/// Reasons the learned classifier cannot produce a result.
///
/// Every variant is treated as "model unavailable" by the composite
/// classifier, which falls back to the next strategy.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The model artifact is missing or cannot be opened.
    #[error("Model artifact unavailable at {path}: {reason}")]
    ArtifactUnavailable { path: String, reason: String },

    /// The metadata document is missing, unreadable or inconsistent.
    #[error("Model metadata invalid: {0}")]
    InvalidMetadata(String),

    /// Computed feature count differs from the declared count.
    #[error("Feature count mismatch: computed {computed}, metadata declares {declared}")]
    FeatureMismatch { computed: usize, declared: usize },

    /// The model returned a different number of scores than classes.
    #[error("Model returned {scores} scores for {classes} classes")]
    OutputMismatch { scores: usize, classes: usize },

    /// The runtime failed while scoring.
    #[error("Model inference failed: {0}")]
    InferenceFailed(String),
}

/// Failures inside the inference engine for a single visit.
///
/// These never reach the caller of the engine; they are logged and counted.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Correlation store read or write failed.
    #[error("Correlation store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),
}

/// Types of failures that can occur while inferring a region for a visit.
///
/// None of these fail the visit; they are counted for the end-of-run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum ErrorType {
    /// Model artifact or metadata missing or unreadable
    ModelUnavailable,
    /// Computed feature vector does not match the model metadata
    FeatureMismatch,
    /// Model inference exceeded its time budget
    ModelTimeout,
    /// Model runtime error during scoring
    ModelInferenceError,
    /// Correlation store read/write failure
    StoreUnavailable,
    /// A stored cluster snapshot could not be parsed
    InvalidClusterSnapshot,
    /// Visit record rejected at the ingestion boundary
    InvalidVisitRecord,
    /// Visit row could not be written
    VisitWriteError,
}

/// Types of informational metrics recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum InfoType {
    /// Visit had no successful probes
    InputIncomplete,
    /// Pattern matched a cluster by signature
    ExactClusterMatch,
    /// Pattern matched a cluster by similarity
    FuzzyClusterMatch,
    /// Pattern started a new cluster
    NewCluster,
    /// Signature matched but the stored snapshot differed
    SignatureCollision,
    /// Region came from the learned model
    LearnedClassification,
    /// Region came from the heuristic
    HeuristicClassification,
    /// No strategy produced a region
    NoClassification,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::ModelUnavailable => "Model unavailable",
            ErrorType::FeatureMismatch => "Feature count mismatch",
            ErrorType::ModelTimeout => "Model inference timeout",
            ErrorType::ModelInferenceError => "Model inference error",
            ErrorType::StoreUnavailable => "Correlation store unavailable",
            ErrorType::InvalidClusterSnapshot => "Invalid cluster snapshot",
            ErrorType::InvalidVisitRecord => "Invalid visit record",
            ErrorType::VisitWriteError => "Visit write error",
        }
    }
}

impl InfoType {
    /// Returns a human-readable string representation of the info type.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoType::InputIncomplete => "No successful probes",
            InfoType::ExactClusterMatch => "Exact cluster match",
            InfoType::FuzzyClusterMatch => "Fuzzy cluster match",
            InfoType::NewCluster => "New cluster",
            InfoType::SignatureCollision => "Signature collision",
            InfoType::LearnedClassification => "Learned classification",
            InfoType::HeuristicClassification => "Heuristic classification",
            InfoType::NoClassification => "No classification",
        }
    }
}

impl ModelError {
    /// Maps the failure onto the counter it is reported under.
    pub fn error_type(&self) -> ErrorType {
        match self {
            ModelError::ArtifactUnavailable { .. } | ModelError::InvalidMetadata(_) => {
                ErrorType::ModelUnavailable
            }
            ModelError::FeatureMismatch { .. } => ErrorType::FeatureMismatch,
            ModelError::OutputMismatch { .. } | ModelError::InferenceFailed(_) => {
                ErrorType::ModelInferenceError
            }
        }
    }
}
