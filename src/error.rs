//! Error taxonomy shared across the pipeline.

use thiserror::Error;

/// Errors surfaced by the collection, cleaning and portrait operations.
///
/// The dispatch layer is the only place these are mapped to HTTP statuses:
/// `InvalidInput` → 400, `NotFound` → 404, everything else → 500.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed URL, out-of-range run id, disallowed order value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Missing run data (no clean comments, no stored portrait).
    #[error("not found: {0}")]
    NotFound(String),

    /// The comment source or the LLM provider failed in a non-retryable way,
    /// or retries were exhausted.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Missing credentials or model; raised at the point of use so endpoints
    /// that do not need the LLM keep functioning without it configured.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
