//! Error types for the journey engine.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// A collaborator has no record for the requested key (contract, employee).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Punches that cannot describe a real working day
    /// (clock-out before clock-in, break outside the shift, ...).
    #[error("Data integrity violation on {date}: {detail}")]
    DataIntegrity { date: NaiveDate, detail: String },

    /// Reading or writing the time bank ledger failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Caller supplied input the engine cannot work with.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Batch was cancelled or ran past its deadline before this item started.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialisable classification of an [`Error`], used where failures are
/// reported as data (company rollups, HTTP bodies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    DataIntegrity,
    Persistence,
    InvalidInput,
    Cancelled,
    Config,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::DataIntegrity { .. } => ErrorKind::DataIntegrity,
            Error::Persistence(_) => ErrorKind::Persistence,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) | Error::Json(_) => ErrorKind::Io,
        }
    }
}
