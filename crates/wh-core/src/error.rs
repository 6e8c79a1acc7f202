//! Error types for wh-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in wh-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse CSV
    #[error("failed to parse CSV '{path}': {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A source key that is neither an entity type nor an auxiliary source
    #[error("unknown source '{0}'")]
    UnknownSource(String),

    /// An entity type name that does not exist
    #[error("unknown entity type '{0}'")]
    UnknownEntityType(String),

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Entity store failure outside of the per-record reconciliation path
    #[error("entity store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
