//! Error types for risk engine

use thiserror::Error;

/// Risk engine error
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid input (negative cost, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Calculation error (decimal overflow)
    #[error("Calculation error: {0}")]
    Calculation(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
