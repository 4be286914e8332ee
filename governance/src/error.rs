//! Error types for governed execution

use crate::transaction::TransactionState;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Result type for governance operations
pub type Result<T> = std::result::Result<T, Error>;

/// Governance errors
///
/// `Validation` happens before any ledger interaction. `BudgetExceeded` and
/// `UpstreamExecution` are routine outcomes that already have an audit
/// record. `PersistenceFailure` means the atomic commit did not happen and
/// nothing was recorded.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Admission blocked
    #[error(
        "Budget exceeded: limit {limit}, current usage {current_usage_percent}% (audit record {audit_id})"
    )]
    BudgetExceeded {
        /// Id of the blocked record
        audit_id: u64,
        /// Configured spend limit
        limit: Decimal,
        /// Usage before this request, in percent of the limit
        current_usage_percent: Decimal,
        /// Projected usage with this request
        budget_impact_percent: Decimal,
    },

    /// External call failed or timed out
    #[error("Upstream execution failed: {reason} (audit record {audit_id})")]
    UpstreamExecution {
        /// Id of the error record
        audit_id: u64,
        /// Failure description
        reason: String,
    },

    /// The atomic debit+log commit did not complete
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Ledger rejected the operation
    #[error("Ledger error: {0}")]
    Ledger(ledger_core::Error),

    /// Risk policy error
    #[error("Risk assessment error: {0}")]
    Risk(#[from] risk_engine::Error),

    /// Illegal state machine step
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: TransactionState,
        /// Requested state
        to: TransactionState,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ledger_core::Error> for Error {
    fn from(err: ledger_core::Error) -> Self {
        match err {
            ledger_core::Error::Risk(e) => Error::Risk(e),
            ledger_core::Error::Config(msg) => Error::Config(msg),
            e @ ledger_core::Error::Overdraw { .. } => Error::Validation(e.to_string()),
            ledger_core::Error::Encoding(e) => Error::PersistenceFailure(e.to_string()),
            e if e.is_persistence() => Error::PersistenceFailure(e.to_string()),
            e => Error::Ledger(e),
        }
    }
}

impl Error {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::BudgetExceeded { .. } => "budget_exceeded",
            Error::UpstreamExecution { .. } => "upstream_execution_error",
            Error::PersistenceFailure(_) => "persistence_failure",
            Error::Ledger(_) | Error::Risk(_) | Error::InvalidTransition { .. } => "internal_error",
            Error::Config(_) | Error::Io(_) => "configuration_error",
        }
    }

    /// HTTP status a front-end should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::BudgetExceeded { .. } => 402,
            Error::UpstreamExecution { .. } => 502,
            _ => 500,
        }
    }

    /// Audit record that documents this outcome, if one was committed
    pub fn audit_id(&self) -> Option<u64> {
        match self {
            Error::BudgetExceeded { audit_id, .. } | Error::UpstreamExecution { audit_id, .. } => {
                Some(*audit_id)
            }
            _ => None,
        }
    }

    /// Whether durable state may be inconsistent with the caller's view
    pub fn is_integrity_emergency(&self) -> bool {
        matches!(self, Error::PersistenceFailure(_))
    }
}

/// Boundary error body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Error kind
    pub error: &'static str,
    /// Human readable message
    pub message: String,
    /// Audit record id, for recorded outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<u64>,
    /// Spend limit, for blocked calls
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub limit: Option<Decimal>,
    /// Usage before the blocked call
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub current_usage_percent: Option<Decimal>,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        let (limit, current_usage_percent) = match err {
            Error::BudgetExceeded {
                limit,
                current_usage_percent,
                ..
            } => (Some(*limit), Some(*current_usage_percent)),
            _ => (None, None),
        };

        Self {
            error: err.kind(),
            message: err.to_string(),
            audit_id: err.audit_id(),
            limit,
            current_usage_percent,
        }
    }
}
