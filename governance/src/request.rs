//! Boundary request and response types
//!
//! Front-ends historically sent several shapes for the same call. They are
//! all accepted here and normalized into one [`GovernedRequest`].

use crate::{Error, Result};
use ledger_core::{Charge, ExecutionIntent};
use risk_engine::RiskLevel;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical governed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernedRequest {
    /// Who asked
    #[serde(alias = "requester_id", alias = "user_id", alias = "userId")]
    pub requester_id: String,

    /// Whose budget pays; the requester when absent
    #[serde(
        default,
        alias = "budget_owner_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub budget_owner_id: Option<String>,

    /// Content sent to the external collaborator
    #[serde(alias = "text", alias = "message", alias = "prompt")]
    pub payload: String,

    /// Declared purpose of the call
    #[serde(
        default,
        alias = "executionIntent",
        alias = "execution_intent",
        skip_serializing_if = "Option::is_none"
    )]
    pub intent: Option<ExecutionIntent>,

    /// Upstream endpoint the call is meant for
    #[serde(
        default,
        alias = "targetUrl",
        alias = "target_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub target: Option<String>,
}

impl GovernedRequest {
    /// Request paid for by its requester
    pub fn new(requester_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            requester_id: requester_id.into(),
            budget_owner_id: None,
            payload: payload.into(),
            intent: None,
            target: None,
        }
    }

    /// Charge a different budget owner
    pub fn with_budget_owner(mut self, owner: impl Into<String>) -> Self {
        self.budget_owner_id = Some(owner.into());
        self
    }

    /// Declare what the call is for
    pub fn with_intent(mut self, intent: ExecutionIntent) -> Self {
        self.intent = Some(intent);
        self
    }

    /// Name the upstream endpoint
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Parse any accepted front-end shape
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| Error::Validation(e.to_string()))
    }

    /// Effective budget owner
    pub fn budget_owner(&self) -> &str {
        match self.budget_owner_id.as_deref() {
            Some(owner) if !owner.trim().is_empty() => owner,
            _ => &self.requester_id,
        }
    }

    /// Reject malformed requests before any ledger interaction
    pub fn validate(&self, max_payload_chars: usize) -> Result<()> {
        if self.requester_id.trim().is_empty() {
            return Err(Error::Validation("requesterId is required".to_string()));
        }
        if self.payload.trim().is_empty() {
            return Err(Error::Validation("payload must not be empty".to_string()));
        }

        let chars = self.payload.chars().count();
        if chars > max_payload_chars {
            return Err(Error::Validation(format!(
                "payload has {} characters, maximum is {}",
                chars, max_payload_chars
            )));
        }
        Ok(())
    }
}

/// Successful governed call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReceipt {
    /// Success record id
    pub audit_id: u64,
    /// Transaction id
    pub execution_id: Uuid,
    /// Billed cost
    #[serde(with = "rust_decimal::serde::float")]
    pub cost: Decimal,
    /// Balance after the debit
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining_budget: Decimal,
    /// Risk tier at admission
    pub risk_level: RiskLevel,
    /// External call result
    pub result: String,
}

/// Administrative balance change
///
/// Exactly one of `target_balance` and `delta` must be given. Neither may
/// leave the balance below zero, except that a positive `delta` is always
/// accepted so an overdraft can be paid down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRequest {
    /// Set the balance to this value
    #[serde(
        default,
        alias = "target_balance",
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_balance: Option<Decimal>,

    /// Add this amount (negative removes funds)
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub delta: Option<Decimal>,

    /// Administrator performing the change
    #[serde(alias = "admin_id")]
    pub admin_id: String,

    /// Free-form justification
    #[serde(default)]
    pub note: String,
}

impl AdjustmentRequest {
    /// Set the balance to `target`
    pub fn target(admin_id: impl Into<String>, target: Decimal) -> Self {
        Self {
            target_balance: Some(target),
            delta: None,
            admin_id: admin_id.into(),
            note: String::new(),
        }
    }

    /// Move the balance by `delta`
    pub fn delta(admin_id: impl Into<String>, delta: Decimal) -> Self {
        Self {
            target_balance: None,
            delta: Some(delta),
            admin_id: admin_id.into(),
            note: String::new(),
        }
    }

    /// Attach a note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Balance effect of this adjustment
    pub fn charge(&self) -> Result<Charge> {
        if self.admin_id.trim().is_empty() {
            return Err(Error::Validation("adminId is required".to_string()));
        }

        match (self.target_balance, self.delta) {
            (Some(target), None) if target < Decimal::ZERO => Err(Error::Validation(format!(
                "targetBalance must not be negative, got {}",
                target
            ))),
            (Some(target), None) => Ok(Charge::SetBalance(target)),
            // A credit is a negative cost
            (None, Some(delta)) => Ok(Charge::Debit(-delta)),
            (Some(_), Some(_)) => Err(Error::Validation(
                "give either targetBalance or delta, not both".to_string(),
            )),
            (None, None) => Err(Error::Validation(
                "targetBalance or delta is required".to_string(),
            )),
        }
    }
}

/// Applied adjustment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentReceipt {
    /// Adjustment record id
    pub audit_id: u64,
    /// Balance before
    #[serde(with = "rust_decimal::serde::float")]
    pub previous_balance: Decimal,
    /// Balance after
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining_budget: Decimal,
    /// Signed change
    #[serde(with = "rust_decimal::serde::float")]
    pub delta: Decimal,
}
