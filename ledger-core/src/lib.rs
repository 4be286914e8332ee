//! Governance Ledger Core
//!
//! A single authoritative budget balance plus an append-only, hashed audit
//! trail, updated together by one atomic commit.
//!
//! # Architecture
//!
//! - **Single Writer**: One actor task orders every admission and commit
//! - **Atomic Commit**: Balance row and audit record share one write batch
//! - **Reservations**: Admitted requests hold their estimate until commit
//! - **Self-hashing records**: Each record carries a SHA-256 over its fields
//!
//! # Invariants
//!
//! - Conservation: initial budget − Σ(record costs) == current balance
//! - Snapshot: every `balance_after` equals the balance right after its commit
//! - Append-only: records are never modified or deleted through the API
//! - Block-before-spend: blocked and error records carry zero cost

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod ledger;
pub mod audit;
pub mod crypto;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    AuditDraft, AuditRecord, AuditStatus, Balance, Charge, ExecutionIntent, Purpose, RequestType,
};
pub use storage::{LedgerStorage, MemoryStorage, RocksStorage, ScanOrder};
pub use actor::{Admission, Reservation, WriterStatus};
pub use audit::{AuditFilter, AuditTrail, ExportFormat, TrailSummary, VerificationReport};
pub use ledger::Ledger;
pub use config::Config;
pub use metrics::Metrics;
