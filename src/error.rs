//! Error types shared across the crate.

use thiserror::Error;

/// Failures reading or writing score history.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error("history database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("history i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}

/// Failures persisting user configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
