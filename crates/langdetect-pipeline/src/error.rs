//! Pipeline error types
//!
//! Only [`ClassifyError`] is recoverable: the classification stage turns it
//! into an empty language and the run continues. Every [`PipelineError`] is
//! fatal and propagates to the caller.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Record store failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Connection settings are invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),

    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the operation
    #[error("Store rejected operation: {0}")]
    Rejected(String),
}

/// Per-record classification failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// Input contains nothing the detector can score
    #[error("no classifiable content in input")]
    NoSignal,

    /// Internal detector failure
    #[error("detector error: {0}")]
    Detector(String),
}

/// Fatal pipeline failures
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Result or source counts could not be determined at startup
    #[error("Failed to determine record counts: {0}")]
    Count(#[source] StoreError),

    /// A page of source records could not be read
    #[error("Failed to fetch {limit} source records{}: {source}", at_offset(.offset))]
    Fetch {
        offset: Option<i64>,
        limit: i64,
        #[source]
        source: StoreError,
    },

    /// A bulk insert failed; the batch is still held by the writer
    #[error("Failed to write batch of {pending} results: {source}")]
    Flush {
        pending: usize,
        #[source]
        source: StoreError,
    },

    /// Offset mode: the source returned fewer rows than counted at startup
    #[error(
        "Source drift: {remaining} records still expected but the store returned none; \
         the source table or filter changed during the run"
    )]
    SourceDrift { remaining: i64 },
}

fn at_offset(offset: &Option<i64>) -> String {
    offset.map(|o| format!(" at offset {o}")).unwrap_or_default()
}
