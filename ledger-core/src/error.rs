//! Error types for the ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB or injected failure)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Canonical JSON encoding failed
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Export writer failed
    #[error("Export error: {0}")]
    Export(String),

    /// The atomic debit+log commit did not complete; nothing was persisted
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Audit record not found
    #[error("Audit record not found: {0}")]
    RecordNotFound(u64),

    /// Ledger has not been initialized with a balance
    #[error("Ledger not initialized")]
    NotInitialized,

    /// Invalid draft or amount
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An adjustment would take a non-negative balance below zero
    #[error("Adjustment of {delta} would take balance {balance} below zero")]
    Overdraw {
        /// Balance at commit time
        balance: Decimal,
        /// Signed change requested
        delta: Decimal,
    },

    /// Invariant violation (conservation, id ordering, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Risk policy error
    #[error("Risk assessment error: {0}")]
    Risk(#[from] risk_engine::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Export(err.to_string())
    }
}

impl Error {
    /// Whether this error means durable state may not reflect the request
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Serialization(_) | Error::Persistence(_) | Error::Concurrency(_)
        )
    }
}
