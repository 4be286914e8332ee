//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode at rest, canonical JSON for hashing)
//! - Exact arithmetic (Decimal for money)
//! - Write-once audit records

use chrono::{DateTime, FixedOffset};
use risk_engine::RiskAssessment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The single authoritative remaining-budget value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Remaining budget (negative only when a billed call exceeded its estimate)
    pub remaining_budget: Decimal,

    /// Time of the last committed mutation, in the audit time zone
    pub last_updated_at: DateTime<FixedOffset>,
}

/// Kind of governed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestType {
    /// Call to the metered external AI service
    ExternalCall,
    /// Administrative balance adjustment
    AdminAdjustment,
}

impl RequestType {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::ExternalCall => "external-call",
            RequestType::AdminAdjustment => "admin-adjustment",
        }
    }

    /// Parse from wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "external-call" => Some(RequestType::ExternalCall),
            "admin-adjustment" => Some(RequestType::AdminAdjustment),
            _ => None,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    /// Executed and billed (or adjustment applied)
    Success,
    /// Refused at admission, never executed
    Blocked,
    /// Upstream execution failed, not billed
    Error,
}

impl AuditStatus {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Blocked => "blocked",
            AuditStatus::Error => "error",
        }
    }

    /// Parse from wire name
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(AuditStatus::Success),
            "blocked" => Some(AuditStatus::Blocked),
            "error" => Some(AuditStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared purpose of an external call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// Exploratory or research use
    Research,
    /// Production traffic
    Production,
    /// Debugging
    Debug,
    /// Demonstration
    Demo,
    /// Anything else; see the description
    Other,
}

impl Purpose {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Research => "research",
            Purpose::Production => "production",
            Purpose::Debug => "debug",
            Purpose::Demo => "demo",
            Purpose::Other => "other",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the requester says a call is for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionIntent {
    /// Declared purpose
    pub purpose: Purpose,
    /// Free-form explanation
    #[serde(default)]
    pub description: String,
}

impl ExecutionIntent {
    /// Intent with a description
    pub fn new(purpose: Purpose, description: impl Into<String>) -> Self {
        Self {
            purpose,
            description: description.into(),
        }
    }
}

/// One immutable entry describing a governed transaction's outcome
///
/// Never modified after it is committed. `integrity_hash` covers every other
/// field; see [`crate::crypto::record_hash`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic id assigned at commit
    pub id: u64,

    /// Id of the governance transaction that produced this record
    pub execution_id: Uuid,

    /// Commit time in the audit time zone
    pub timestamp: DateTime<FixedOffset>,

    /// Kind of transaction
    pub request_type: RequestType,

    /// Who made the request
    pub requester_id: String,

    /// Whose budget is charged
    pub budget_owner_id: String,

    /// Declared intent, for external calls that gave one
    pub intent: Option<ExecutionIntent>,

    /// Upstream endpoint the call was sent to
    pub target: Option<String>,

    /// Masked input text or its digest
    pub input: String,

    /// Hex SHA-256 of the request body as received, before masking
    pub input_digest: String,

    /// Masked output text or its digest
    pub output: String,

    /// Amount debited (negative for a credit)
    pub cost: Decimal,

    /// Balance immediately after this commit
    pub balance_after: Decimal,

    /// Outcome
    pub status: AuditStatus,

    /// Admission assessment, for external calls
    pub risk: Option<RiskAssessment>,

    /// Hex SHA-256 over the canonical form of all other fields
    pub integrity_hash: String,
}

impl AuditRecord {
    /// Recompute the digest and compare with the stored one
    pub fn verify_integrity(&self) -> crate::Result<bool> {
        Ok(crate::crypto::record_hash(self)? == self.integrity_hash)
    }
}

/// How a commit changes the balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charge {
    /// Subtract an amount (negative amounts credit)
    Debit(Decimal),
    /// Move the balance to an exact target; the cost is `current - target`
    SetBalance(Decimal),
}

impl Charge {
    /// Resolve against the current balance into `(cost, balance_after)`
    pub fn resolve(&self, current: Decimal) -> crate::Result<(Decimal, Decimal)> {
        match *self {
            Charge::Debit(amount) => {
                let after = current.checked_sub(amount).ok_or_else(|| {
                    crate::Error::InvalidInput(format!("debit of {} overflows balance", amount))
                })?;
                Ok((amount, after))
            }
            Charge::SetBalance(target) => {
                let cost = current.checked_sub(target).ok_or_else(|| {
                    crate::Error::InvalidInput(format!("target {} overflows balance", target))
                })?;
                Ok((cost, target))
            }
        }
    }
}

/// Everything a caller supplies for a commit
///
/// The writer adds id, timestamp, resolved cost, resulting balance and hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDraft {
    /// Governance transaction id
    pub execution_id: Uuid,
    /// Kind of transaction
    pub request_type: RequestType,
    /// Requester
    pub requester_id: String,
    /// Budget owner
    pub budget_owner_id: String,
    /// Declared intent
    pub intent: Option<ExecutionIntent>,
    /// Upstream endpoint
    pub target: Option<String>,
    /// Recorded input
    pub input: String,
    /// Digest of the unmasked request body; the stored input's digest when absent
    pub input_digest: Option<String>,
    /// Recorded output
    pub output: String,
    /// Outcome
    pub status: AuditStatus,
    /// Admission assessment
    pub risk: Option<RiskAssessment>,
    /// Balance effect
    pub charge: Charge,
}

impl AuditDraft {
    /// Executed external call billed at `cost`
    pub fn success(
        execution_id: Uuid,
        requester_id: impl Into<String>,
        budget_owner_id: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        cost: Decimal,
        risk: RiskAssessment,
    ) -> Self {
        Self {
            execution_id,
            request_type: RequestType::ExternalCall,
            requester_id: requester_id.into(),
            budget_owner_id: budget_owner_id.into(),
            intent: None,
            target: None,
            input: input.into(),
            input_digest: None,
            output: output.into(),
            status: AuditStatus::Success,
            risk: Some(risk),
            charge: Charge::Debit(cost),
        }
    }

    /// External call refused at admission
    pub fn blocked(
        execution_id: Uuid,
        requester_id: impl Into<String>,
        budget_owner_id: impl Into<String>,
        input: impl Into<String>,
        risk: RiskAssessment,
    ) -> Self {
        Self {
            execution_id,
            request_type: RequestType::ExternalCall,
            requester_id: requester_id.into(),
            budget_owner_id: budget_owner_id.into(),
            intent: None,
            target: None,
            input: input.into(),
            input_digest: None,
            output: String::new(),
            status: AuditStatus::Blocked,
            risk: Some(risk),
            charge: Charge::Debit(Decimal::ZERO),
        }
    }

    /// External call that failed upstream
    pub fn failed(
        execution_id: Uuid,
        requester_id: impl Into<String>,
        budget_owner_id: impl Into<String>,
        input: impl Into<String>,
        reason: impl Into<String>,
        risk: RiskAssessment,
    ) -> Self {
        Self {
            execution_id,
            request_type: RequestType::ExternalCall,
            requester_id: requester_id.into(),
            budget_owner_id: budget_owner_id.into(),
            intent: None,
            target: None,
            input: input.into(),
            input_digest: None,
            output: reason.into(),
            status: AuditStatus::Error,
            risk: Some(risk),
            charge: Charge::Debit(Decimal::ZERO),
        }
    }

    /// Administrative adjustment
    ///
    /// `input` is filled in by the writer with the previous balance, the
    /// target and the signed delta, so it always matches the committed state.
    pub fn adjustment(
        execution_id: Uuid,
        admin_id: impl Into<String>,
        charge: Charge,
        note: impl Into<String>,
    ) -> Self {
        let admin_id = admin_id.into();
        Self {
            execution_id,
            request_type: RequestType::AdminAdjustment,
            requester_id: admin_id.clone(),
            budget_owner_id: admin_id,
            intent: None,
            target: None,
            input: String::new(),
            input_digest: None,
            output: note.into(),
            status: AuditStatus::Success,
            risk: None,
            charge,
        }
    }

    /// Record the declared intent
    pub fn with_intent(mut self, intent: Option<ExecutionIntent>) -> Self {
        self.intent = intent;
        self
    }

    /// Record the upstream endpoint
    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }

    /// Record the digest of the request body before masking
    pub fn with_input_digest(mut self, digest: impl Into<String>) -> Self {
        self.input_digest = Some(digest.into());
        self
    }

    /// Reject drafts that would break the audit invariants
    pub fn validate(&self) -> crate::Result<()> {
        match (self.request_type, self.status, self.charge) {
            (RequestType::ExternalCall, AuditStatus::Success, Charge::Debit(cost)) => {
                if cost < Decimal::ZERO {
                    return Err(crate::Error::InvalidInput(format!(
                        "external call cost must not be negative, got {}",
                        cost
                    )));
                }
            }
            (RequestType::ExternalCall, _, Charge::Debit(cost)) => {
                if !cost.is_zero() {
                    return Err(crate::Error::InvalidInput(format!(
                        "{} record must carry zero cost, got {}",
                        self.status, cost
                    )));
                }
            }
            (RequestType::ExternalCall, _, Charge::SetBalance(_)) => {
                return Err(crate::Error::InvalidInput(
                    "external calls cannot set the balance".to_string(),
                ));
            }
            (RequestType::AdminAdjustment, AuditStatus::Success, _) => {}
            (RequestType::AdminAdjustment, status, _) => {
                return Err(crate::Error::InvalidInput(format!(
                    "adjustments are recorded as success, got {}",
                    status
                )));
            }
        }

        if self.request_type == RequestType::ExternalCall && self.risk.is_none() {
            return Err(crate::Error::InvalidInput(
                "external call record requires a risk assessment".to_string(),
            ));
        }
        Ok(())
    }

    /// Attach the writer-assigned fields and compute the integrity hash
    pub(crate) fn seal(
        self,
        id: u64,
        timestamp: DateTime<FixedOffset>,
        previous_balance: Decimal,
        cost: Decimal,
        balance_after: Decimal,
    ) -> crate::Result<AuditRecord> {
        let input = match self.request_type {
            RequestType::AdminAdjustment => adjustment_summary(previous_balance, balance_after),
            RequestType::ExternalCall => self.input,
        };
        let input_digest = self
            .input_digest
            .unwrap_or_else(|| crate::crypto::digest_text(&input));

        let mut record = AuditRecord {
            id,
            execution_id: self.execution_id,
            timestamp,
            request_type: self.request_type,
            requester_id: self.requester_id,
            budget_owner_id: self.budget_owner_id,
            intent: self.intent,
            target: self.target,
            input,
            input_digest,
            output: self.output,
            cost,
            balance_after,
            status: self.status,
            risk: self.risk,
            integrity_hash: String::new(),
        };
        record.integrity_hash = crate::crypto::record_hash(&record)?;
        Ok(record)
    }
}

/// Text stored as the input of an adjustment record
pub fn adjustment_summary(previous: Decimal, target: Decimal) -> String {
    let delta = target - previous;
    let sign = if delta.is_sign_negative() && !delta.is_zero() { "" } else { "+" };
    format!(
        "previous_balance={} target_balance={} delta={}{}",
        previous, target, sign, delta
    )
}
