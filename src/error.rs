//! Error types for the Synheart Vitals Agent.

use thiserror::Error;

/// A rejected ingestion request. Nothing is written when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Unknown sensor kind: {0}")]
    UnknownSensor(String),

    #[error("Missing subject id")]
    MissingSubject,

    #[error("Value is not a finite number: {0}")]
    NonFiniteValue(f64),

    #[error("Timestamp is not a finite number: {0}")]
    NonFiniteTimestamp(f64),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Errors raised by reading and anomaly stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Errors returned to ingestion callers.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to persist reading: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Whether the caller sent something we refuse to accept (as opposed to us failing).
    pub fn is_validation(&self) -> bool {
        matches!(self, IngestError::Validation(_))
    }
}
