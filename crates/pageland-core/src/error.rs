//! Error types for Pageland

use thiserror::Error;

/// Result type alias for Pageland operations
pub type AdsResult<T> = Result<T, AdsError>;

/// Main error type for Pageland
#[derive(Error, Debug)]
pub enum AdsError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid ad history item: {0}")]
    InvalidHistoryItem(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Deposit error: {0}")]
    Deposit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdsError {
    /// Create a new database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new invalid history item error
    pub fn invalid_history_item(msg: impl Into<String>) -> Self {
        Self::InvalidHistoryItem(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new deposit error
    pub fn deposit(msg: impl Into<String>) -> Self {
        Self::Deposit(msg.into())
    }
}
