//! Administrative budget operations

use crate::{
    request::{AdjustmentReceipt, AdjustmentRequest},
    Result,
};
use ledger_core::{
    AuditDraft, AuditFilter, Balance, ExportFormat, Ledger, TrailSummary, VerificationReport,
};
use std::io::Write;
use tracing::info;
use uuid::Uuid;

/// Balance adjustments and audit maintenance
#[derive(Debug, Clone)]
pub struct BudgetAdministrator {
    ledger: Ledger,
}

impl BudgetAdministrator {
    /// Administrator over `ledger`
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Current balance
    pub fn balance(&self) -> Result<Balance> {
        Ok(self.ledger.read_balance()?)
    }

    /// Set or move the balance through the atomic commit path
    ///
    /// Always produces an `admin-adjustment` record, even when the balance
    /// does not change.
    pub async fn adjust(&self, request: AdjustmentRequest) -> Result<AdjustmentReceipt> {
        let charge = request.charge()?;
        let draft = AuditDraft::adjustment(Uuid::now_v7(), &request.admin_id, charge, request.note);
        let record = self.ledger.debit_and_commit(draft).await?;

        let previous_balance = record.balance_after + record.cost;
        info!(
            audit_id = record.id,
            admin = %record.requester_id,
            %previous_balance,
            balance = %record.balance_after,
            "Budget adjusted"
        );

        Ok(AdjustmentReceipt {
            audit_id: record.id,
            previous_balance,
            remaining_budget: record.balance_after,
            delta: -record.cost,
        })
    }

    /// Write matching records to `writer`
    pub fn export<W: Write>(
        &self,
        writer: W,
        format: ExportFormat,
        filter: &AuditFilter,
    ) -> Result<usize> {
        Ok(self.ledger.trail().export(writer, format, filter)?)
    }

    /// Totals over matching records
    pub fn summary(&self, filter: &AuditFilter) -> Result<TrailSummary> {
        Ok(self.ledger.trail().summarize(filter)?)
    }

    /// Check every record and the balance against the trail
    pub fn verify(&self) -> Result<VerificationReport> {
        Ok(self.ledger.verify()?)
    }
}
