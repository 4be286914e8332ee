//! Budget-governed execution
//!
//! Every metered external call goes through a [`GovernanceEngine`]:
//!
//! 1. The payload is priced by the cost estimator
//! 2. The risk assessor admits or blocks it against the available budget
//! 3. Admitted calls run under a timeout
//! 4. Exactly one hashed audit record is committed together with the debit
//!
//! Administrative top-ups and corrections go through the same atomic path via
//! [`BudgetAdministrator`].

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod admin;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod redact;
pub mod request;
pub mod transaction;

pub use admin::BudgetAdministrator;
pub use config::Config;
pub use engine::GovernanceEngine;
pub use error::{Error, ErrorResponse, Result};
pub use executor::{ExecutionError, Executor, MockExecutor};
pub use redact::{AuditContentMode, NoopRedactor, Redactor};
pub use request::{AdjustmentReceipt, AdjustmentRequest, CallReceipt, GovernedRequest};
pub use transaction::{GovernanceTransaction, TransactionState};
