//! Audit trail read side: query, verification and export
//!
//! Records are only ever appended by the ledger writer; nothing here mutates
//! storage. Tampering that bypasses the ledger is detected, not prevented:
//! [`AuditTrail::verify`] recomputes every hash, checks that ids are
//! contiguous and replays balances against the initial budget.

use crate::{
    storage::{LedgerStorage, ScanOrder},
    types::{AuditRecord, AuditStatus, RequestType},
    Error, Result,
};
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use std::ops::ControlFlow;
use std::str::FromStr;
use std::sync::Arc;

/// Selection over the audit trail
///
/// Empty filter matches everything, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFilter {
    /// Only this outcome
    pub status: Option<AuditStatus>,
    /// Only this kind of transaction
    pub request_type: Option<RequestType>,
    /// Only this requester
    pub requester_id: Option<String>,
    /// Only this budget owner
    pub budget_owner_id: Option<String>,
    /// Inclusive lower bound on the timestamp
    pub since: Option<DateTime<FixedOffset>>,
    /// Inclusive upper bound on the timestamp
    pub until: Option<DateTime<FixedOffset>>,
    /// Stop after this many matches
    pub limit: Option<usize>,
    /// Iteration order
    pub order: ScanOrder,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            status: None,
            request_type: None,
            requester_id: None,
            budget_owner_id: None,
            since: None,
            until: None,
            limit: None,
            order: ScanOrder::Descending,
        }
    }
}

impl AuditFilter {
    /// Match everything, newest first
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a status
    pub fn with_status(mut self, status: AuditStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to a request type
    pub fn with_request_type(mut self, request_type: RequestType) -> Self {
        self.request_type = Some(request_type);
        self
    }

    /// Restrict to a requester
    pub fn with_requester(mut self, requester_id: impl Into<String>) -> Self {
        self.requester_id = Some(requester_id.into());
        self
    }

    /// Restrict to a time range (both ends inclusive)
    pub fn between(
        mut self,
        since: Option<DateTime<FixedOffset>>,
        until: Option<DateTime<FixedOffset>>,
    ) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Cap the number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Oldest first
    pub fn ascending(mut self) -> Self {
        self.order = ScanOrder::Ascending;
        self
    }

    /// Whether a record passes every criterion
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if self.status.is_some_and(|s| s != record.status) {
            return false;
        }
        if self.request_type.is_some_and(|t| t != record.request_type) {
            return false;
        }
        if let Some(ref requester) = self.requester_id {
            if &record.requester_id != requester {
                return false;
            }
        }
        if let Some(ref owner) = self.budget_owner_id {
            if &record.budget_owner_id != owner {
                return false;
            }
        }
        if self.since.is_some_and(|since| record.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| record.timestamp > until) {
            return false;
        }
        true
    }
}

/// Export serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One JSON record per line
    Jsonl,
    /// Flat CSV with a header row
    Csv,
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "ndjson" => Ok(ExportFormat::Jsonl),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(Error::InvalidInput(format!("unknown export format: {}", other))),
        }
    }
}

/// Result of a full-trail integrity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Records read
    pub records_checked: u64,
    /// Ids whose stored hash does not match their content
    pub hash_mismatches: Vec<u64>,
    /// `(expected, found)` where the id sequence skips
    pub id_gaps: Vec<(u64, u64)>,
    /// Ids whose `balance_after` does not follow from the previous record
    pub balance_mismatches: Vec<u64>,
    /// Blocked or error records carrying a non-zero cost
    pub charged_without_execution: Vec<u64>,
    /// Budget the ledger was created with
    pub initial_budget: Decimal,
    /// `initial_budget - Σ cost`
    pub replayed_balance: Decimal,
    /// Balance currently stored
    pub stored_balance: Decimal,
}

impl VerificationReport {
    /// Replayed balance equals the stored one
    pub fn is_conserved(&self) -> bool {
        self.replayed_balance == self.stored_balance
    }

    /// No findings at all
    pub fn is_clean(&self) -> bool {
        self.hash_mismatches.is_empty()
            && self.id_gaps.is_empty()
            && self.balance_mismatches.is_empty()
            && self.charged_without_execution.is_empty()
            && self.is_conserved()
    }
}

/// Totals over a selection of the stored trail
///
/// Derived from records, so it survives restarts; live counters such as
/// latency or outstanding reservations are only in [`crate::Metrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrailSummary {
    /// Records matched
    pub records: u64,
    /// External calls executed and billed
    pub succeeded: u64,
    /// External calls refused at admission
    pub blocked: u64,
    /// External calls that failed upstream
    pub errored: u64,
    /// Administrative adjustments
    pub adjustments: u64,
    /// Σ cost of billed calls
    pub total_billed: Decimal,
    /// Σ signed change applied by adjustments
    pub net_adjusted: Decimal,
}

impl TrailSummary {
    fn add(&mut self, record: &AuditRecord) {
        self.records += 1;
        match (record.request_type, record.status) {
            (RequestType::AdminAdjustment, _) => {
                self.adjustments += 1;
                self.net_adjusted -= record.cost;
            }
            (RequestType::ExternalCall, AuditStatus::Success) => {
                self.succeeded += 1;
                self.total_billed += record.cost;
            }
            (RequestType::ExternalCall, AuditStatus::Blocked) => self.blocked += 1,
            (RequestType::ExternalCall, AuditStatus::Error) => self.errored += 1,
        }
    }
}

/// CSV column names, in [`CsvRow`] field order
const CSV_HEADER: [&str; 23] = [
    "id",
    "execution_id",
    "timestamp",
    "request_type",
    "requester_id",
    "budget_owner_id",
    "purpose",
    "intent_description",
    "target",
    "input",
    "input_digest",
    "output",
    "cost",
    "balance_after",
    "status",
    "estimated_cost",
    "current_usage",
    "limit",
    "current_usage_percent",
    "budget_impact_percent",
    "risk_level",
    "decision",
    "integrity_hash",
];

/// One flat export row; risk and intent fields are empty when absent
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: u64,
    execution_id: String,
    timestamp: String,
    request_type: &'static str,
    requester_id: &'a str,
    budget_owner_id: &'a str,
    purpose: Option<&'static str>,
    intent_description: Option<&'a str>,
    target: Option<&'a str>,
    input: &'a str,
    input_digest: &'a str,
    output: &'a str,
    cost: String,
    balance_after: String,
    status: &'static str,
    estimated_cost: Option<String>,
    current_usage: Option<String>,
    limit: Option<String>,
    current_usage_percent: Option<String>,
    budget_impact_percent: Option<String>,
    risk_level: Option<&'static str>,
    decision: Option<&'static str>,
    integrity_hash: &'a str,
}

impl<'a> From<&'a AuditRecord> for CsvRow<'a> {
    fn from(record: &'a AuditRecord) -> Self {
        let risk = record.risk.as_ref();
        Self {
            id: record.id,
            execution_id: record.execution_id.to_string(),
            timestamp: record.timestamp.to_rfc3339(),
            request_type: record.request_type.as_str(),
            requester_id: &record.requester_id,
            budget_owner_id: &record.budget_owner_id,
            purpose: record.intent.as_ref().map(|i| i.purpose.as_str()),
            intent_description: record.intent.as_ref().map(|i| i.description.as_str()),
            target: record.target.as_deref(),
            input: &record.input,
            input_digest: &record.input_digest,
            output: &record.output,
            cost: record.cost.to_string(),
            balance_after: record.balance_after.to_string(),
            status: record.status.as_str(),
            estimated_cost: risk.map(|r| r.estimated_cost.to_string()),
            current_usage: risk.map(|r| r.current_usage.to_string()),
            limit: risk.map(|r| r.limit.to_string()),
            current_usage_percent: risk.map(|r| r.current_usage_percent.to_string()),
            budget_impact_percent: risk.map(|r| r.budget_impact_percent.to_string()),
            risk_level: risk.map(|r| r.risk_level.as_str()),
            decision: risk.map(|r| r.decision.as_str()),
            integrity_hash: &record.integrity_hash,
        }
    }
}

/// Read-only view over the audit trail
#[derive(Clone)]
pub struct AuditTrail {
    storage: Arc<dyn LedgerStorage>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail").finish_non_exhaustive()
    }
}

impl AuditTrail {
    /// Create a view over a storage backend
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self { storage }
    }

    /// Fetch one record
    pub fn get(&self, id: u64) -> Result<AuditRecord> {
        self.storage.get_record(id)?.ok_or(Error::RecordNotFound(id))
    }

    /// Visit matching records in filter order
    pub fn for_each<F>(&self, filter: &AuditFilter, mut visit: F) -> Result<usize>
    where
        F: FnMut(AuditRecord) -> Result<()>,
    {
        let mut matched = 0usize;
        let mut failure = None;

        self.storage.scan_records(filter.order, &mut |record| {
            if filter.limit.is_some_and(|limit| matched >= limit) {
                return ControlFlow::Break(());
            }
            if !filter.matches(&record) {
                return ControlFlow::Continue(());
            }
            if let Err(e) = visit(record) {
                failure = Some(e);
                return ControlFlow::Break(());
            }
            matched += 1;
            ControlFlow::Continue(())
        })?;

        match failure {
            Some(e) => Err(e),
            None => Ok(matched),
        }
    }

    /// Collect matching records
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        let mut records = Vec::new();
        self.for_each(filter, |record| {
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    /// Count and total matching records
    pub fn summarize(&self, filter: &AuditFilter) -> Result<TrailSummary> {
        let mut summary = TrailSummary::default();
        self.for_each(filter, |record| {
            summary.add(&record);
            Ok(())
        })?;
        Ok(summary)
    }

    /// Write matching records; returns how many were written
    pub fn export<W: Write>(
        &self,
        writer: W,
        format: ExportFormat,
        filter: &AuditFilter,
    ) -> Result<usize> {
        let count = match format {
            ExportFormat::Jsonl => {
                let mut writer = std::io::BufWriter::new(writer);
                let count = self.for_each(filter, |record| {
                    serde_json::to_writer(&mut writer, &record)?;
                    writer.write_all(b"\n")?;
                    Ok(())
                })?;
                writer.flush()?;
                count
            }
            ExportFormat::Csv => {
                let mut writer = csv::WriterBuilder::new()
                    .has_headers(false)
                    .from_writer(writer);
                // Header first so an empty selection is still a table
                writer.write_record(CSV_HEADER)?;
                let count = self.for_each(filter, |record| {
                    writer.serialize(CsvRow::from(&record))?;
                    Ok(())
                })?;
                writer.flush()?;
                count
            }
        };

        tracing::info!(records = count, format = ?format, "Audit trail exported");
        Ok(count)
    }

    /// Check every record and the balance replay
    pub fn verify(&self) -> Result<VerificationReport> {
        let initial_budget = self.storage.initial_budget()?.ok_or(Error::NotInitialized)?;
        let stored_balance = self
            .storage
            .load_balance()?
            .ok_or(Error::NotInitialized)?
            .remaining_budget;

        let mut report = VerificationReport {
            records_checked: 0,
            hash_mismatches: Vec::new(),
            id_gaps: Vec::new(),
            balance_mismatches: Vec::new(),
            charged_without_execution: Vec::new(),
            initial_budget,
            replayed_balance: initial_budget,
            stored_balance,
        };

        let mut expected_id = 1u64;
        let mut previous_balance = initial_budget;
        let mut failure = None;

        self.storage.scan_records(ScanOrder::Ascending, &mut |record| {
            report.records_checked += 1;

            match record.verify_integrity() {
                Ok(true) => {}
                Ok(false) => report.hash_mismatches.push(record.id),
                Err(e) => {
                    failure = Some(e);
                    return ControlFlow::Break(());
                }
            }

            if record.id != expected_id {
                report.id_gaps.push((expected_id, record.id));
            }
            expected_id = record.id + 1;

            if previous_balance - record.cost != record.balance_after {
                report.balance_mismatches.push(record.id);
            }
            previous_balance = record.balance_after;

            if record.status != AuditStatus::Success && !record.cost.is_zero() {
                report.charged_without_execution.push(record.id);
            }

            report.replayed_balance -= record.cost;
            ControlFlow::Continue(())
        })?;

        if let Some(e) = failure {
            return Err(e);
        }

        if report.is_clean() {
            tracing::info!(records = report.records_checked, "Audit trail verified");
        } else {
            tracing::warn!(
                records = report.records_checked,
                hash_mismatches = report.hash_mismatches.len(),
                id_gaps = report.id_gaps.len(),
                balance_mismatches = report.balance_mismatches.len(),
                conserved = report.is_conserved(),
                "Audit trail verification found inconsistencies"
            );
        }

        Ok(report)
    }
}
