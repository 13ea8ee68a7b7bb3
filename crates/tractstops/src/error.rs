//! Error types for tractstops.
//!
//! Only failures that stop an operation outright live here. Row-level data
//! problems (a malformed coordinate, an unknown tract id) are counted in the
//! load and join reports instead, so a run always yields a best-effort result.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for tractstops operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Input Errors ===
    /// An input CSV file could not be read.
    #[error("failed to read {path}: {source}")]
    CsvRead {
        /// Path to the CSV file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: csv::Error,
    },

    /// An input file lacks a column the loader cannot do without.
    #[error("{path} is missing required column '{column}'")]
    MissingColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// Name of the missing column.
        column: &'static str,
    },

    /// No input file was configured for a dataset.
    #[error("no {dataset} file configured (pass --{dataset} or set data.{dataset}_path)")]
    MissingInput {
        /// Which dataset is missing (`stops` or `tracts`).
        dataset: &'static str,
    },

    // === Analysis Errors ===
    /// A column name does not exist in the tract aggregate table.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// A category label could not be parsed.
    #[error("unknown {kind} '{label}'")]
    UnknownCategory {
        /// The category family (`race`, `activity`).
        kind: &'static str,
        /// The label that failed to parse.
        label: String,
    },

    /// Not enough usable points to fit a trendline.
    #[error("insufficient data: need at least {needed} tracts with values on both axes, found {found}")]
    InsufficientData {
        /// Minimum number of points needed.
        needed: usize,
        /// Number of usable points found.
        found: usize,
    },

    /// The regression has no unique solution (every x value is the same).
    #[error("degenerate fit: {reason}")]
    DegenerateFit {
        /// Why the fit is undefined.
        reason: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV output failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for tractstops operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an unknown category error.
    #[must_use]
    pub fn unknown_category(kind: &'static str, label: impl Into<String>) -> Self {
        Self::UnknownCategory {
            kind,
            label: label.into(),
        }
    }

    /// Create a degenerate fit error.
    #[must_use]
    pub fn degenerate_fit(reason: impl Into<String>) -> Self {
        Self::DegenerateFit {
            reason: reason.into(),
        }
    }

    /// Check if this error means a fit could not be computed from the data.
    ///
    /// Callers plotting many fits treat these as "no trendline" rather than
    /// a failure of the whole run.
    #[must_use]
    pub fn is_fit_unavailable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::DegenerateFit { .. }
        )
    }
}
