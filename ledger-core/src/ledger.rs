//! Main ledger orchestration layer
//!
//! This module ties together storage, the single-writer actor and the audit
//! trail into the API used by governance transactions.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{AuditDraft, Charge, Config, Ledger};
//! use rust_decimal::Decimal;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     let draft = AuditDraft::adjustment(
//!         Uuid::now_v7(),
//!         "admin",
//!         Charge::SetBalance(Decimal::from(1000)),
//!         "monthly top-up",
//!     );
//!     let record = ledger.debit_and_commit(draft).await?;
//!     assert_eq!(record.balance_after, Decimal::from(1000));
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, Admission, LedgerHandle, Reservation, WriterStatus},
    audit::{AuditTrail, VerificationReport},
    storage::{LedgerStorage, RocksStorage},
    types::{AuditDraft, AuditRecord, Balance},
    Config, Error, Metrics, Result,
};
use risk_engine::RiskAssessor;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Main ledger interface
#[derive(Clone)]
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<dyn LedgerStorage>,

    /// Metrics shared with the writer
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("data_dir", &self.config.data_dir)
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open the RocksDB-backed ledger
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(RocksStorage::open(&config)?);
        Self::with_storage(config, storage).await
    }

    /// Open over any storage backend
    pub async fn with_storage(config: Config, storage: Arc<dyn LedgerStorage>) -> Result<Self> {
        config.validate()?;
        let metrics = Metrics::new().map_err(|e| Error::Config(format!("metrics: {}", e)))?;
        let handle = spawn_ledger_actor(storage.clone(), &config, metrics.clone())?;

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    /// Current balance as last committed
    pub fn read_balance(&self) -> Result<Balance> {
        self.storage.load_balance()?.ok_or(Error::NotInitialized)
    }

    /// Budget the ledger was created with
    pub fn initial_budget(&self) -> Result<Decimal> {
        self.storage.initial_budget()?.ok_or(Error::NotInitialized)
    }

    /// Assess a request against the available balance
    ///
    /// Admitted requests get a reservation on their estimate that lasts until
    /// it is committed or dropped.
    pub async fn admit(&self, estimated_cost: Decimal, assessor: &RiskAssessor) -> Result<Admission> {
        self.handle.admit(estimated_cost, *assessor).await
    }

    /// Atomically apply the draft's balance effect and append its record
    pub async fn debit_and_commit(&self, draft: AuditDraft) -> Result<AuditRecord> {
        self.handle.commit(draft, None).await
    }

    /// Like [`Ledger::debit_and_commit`], consuming an admission reservation
    pub async fn commit_reserved(
        &self,
        draft: AuditDraft,
        reservation: Option<Reservation>,
    ) -> Result<AuditRecord> {
        self.handle.commit(draft, reservation).await
    }

    /// Read-only view of the audit trail
    pub fn trail(&self) -> AuditTrail {
        AuditTrail::new(self.storage.clone())
    }

    /// Verify hashes, id sequence and balance conservation
    pub fn verify(&self) -> Result<VerificationReport> {
        self.trail().verify()
    }

    /// Writer cache and reservation state
    pub async fn writer_status(&self) -> Result<WriterStatus> {
        self.handle.status().await
    }

    /// Ledger metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger writer
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditFilter;
    use crate::types::{AuditStatus, Charge, RequestType};
    use risk_engine::RiskThresholds;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn create_test_ledger(initial: i64) -> (Ledger, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            initial_budget: Decimal::from(initial),
            sync_writes: false,
            ..Config::default()
        };

        (Ledger::open(config).await.unwrap(), temp_dir)
    }

    fn assessor() -> RiskAssessor {
        RiskAssessor::new(Decimal::from(10), RiskThresholds::default()).unwrap()
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let (ledger, _temp) = create_test_ledger(10).await;
        assert_eq!(ledger.read_balance().unwrap().remaining_budget, Decimal::from(10));
        assert_eq!(ledger.initial_budget().unwrap(), Decimal::from(10));
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_debit_and_read_back() {
        let (ledger, _temp) = create_test_ledger(10).await;

        let admission = ledger.admit(Decimal::new(5, 2), &assessor()).await.unwrap();
        assert!(admission.is_admitted());

        let draft = AuditDraft::success(
            Uuid::now_v7(),
            "alice",
            "alice",
            "hello",
            "",
            Decimal::new(5, 2),
            admission.assessment.clone(),
        );
        let record = ledger.commit_reserved(draft, admission.reservation).await.unwrap();

        assert_eq!(record.balance_after, Decimal::new(995, 2));
        assert_eq!(ledger.read_balance().unwrap().remaining_budget, Decimal::new(995, 2));
        assert_eq!(ledger.trail().get(record.id).unwrap(), record);
        assert_eq!(ledger.metrics().commits("success"), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_blocked_record_keeps_balance() {
        let (ledger, _temp) = create_test_ledger(10).await;

        let admission = ledger.admit(Decimal::from(11), &assessor()).await.unwrap();
        assert!(!admission.is_admitted());

        let draft = AuditDraft::blocked(Uuid::now_v7(), "bob", "bob", "big", admission.assessment);
        let record = ledger.debit_and_commit(draft).await.unwrap();

        assert_eq!(record.status, AuditStatus::Blocked);
        assert_eq!(record.cost, Decimal::ZERO);
        assert_eq!(record.balance_after, Decimal::from(10));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_adjustment_sets_target() {
        let (ledger, _temp) = create_test_ledger(10).await;

        let draft = AuditDraft::adjustment(
            Uuid::now_v7(),
            "admin",
            Charge::SetBalance(Decimal::from(1000)),
            "top-up",
        );
        let record = ledger.debit_and_commit(draft).await.unwrap();

        assert_eq!(record.request_type, RequestType::AdminAdjustment);
        assert_eq!(record.cost, Decimal::from(-990));
        assert_eq!(record.input, "previous_balance=10 target_balance=1000 delta=+990");
        assert_eq!(ledger.read_balance().unwrap().remaining_budget, Decimal::from(1000));

        let report = ledger.verify().unwrap();
        assert!(report.is_clean());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            initial_budget: Decimal::from(10),
            sync_writes: false,
            ..Config::default()
        };

        {
            let ledger = Ledger::open(config.clone()).await.unwrap();
            let draft = AuditDraft::adjustment(Uuid::now_v7(), "admin", Charge::Debit(Decimal::ONE), "");
            ledger.debit_and_commit(draft).await.unwrap();
            ledger.shutdown().await.unwrap();
            // Let the writer release the database
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        let ledger = Ledger::open(config).await.unwrap();
        assert_eq!(ledger.read_balance().unwrap().remaining_budget, Decimal::from(9));

        let draft = AuditDraft::adjustment(Uuid::now_v7(), "admin", Charge::Debit(Decimal::ONE), "");
        let record = ledger.debit_and_commit(draft).await.unwrap();
        assert_eq!(record.id, 2);

        let ids: Vec<u64> = ledger
            .trail()
            .query(&AuditFilter::all())
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 1]);

        ledger.shutdown().await.unwrap();
    }
}
