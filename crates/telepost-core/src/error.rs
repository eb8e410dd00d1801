//! Unified error types for Telepost.

use thiserror::Error;

/// Result type alias using TelepostError.
pub type Result<T> = std::result::Result<T, TelepostError>;

#[derive(Error, Debug)]
pub enum TelepostError {
    // Ledger errors — fatal to a wake cycle, nothing was committed
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Validation errors — reported before a publication exists
    #[error("Validation failed: {0}")]
    Validation(String),

    // Channel / delivery errors
    #[error("Channel error: {0}")]
    Channel(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl TelepostError {
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
