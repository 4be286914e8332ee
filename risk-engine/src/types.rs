//! Core types for risk engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk tier derived from projected budget consumption
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Projected usage below the medium threshold
    Low,
    /// Projected usage between the medium and high thresholds
    Medium,
    /// Projected usage at or above the high threshold, within the limit
    High,
    /// Projected usage strictly above the limit
    Critical,
}

impl RiskLevel {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Admission verdict for this tier
    pub fn decision(&self) -> AdmissionDecision {
        match self {
            RiskLevel::Low | RiskLevel::Medium => AdmissionDecision::Admit,
            RiskLevel::High => AdmissionDecision::AdmitFlagged,
            RiskLevel::Critical => AdmissionDecision::Block,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block/allow verdict produced before external execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionDecision {
    /// Proceed
    Admit,
    /// Proceed, but the request is close to the limit
    AdmitFlagged,
    /// Do not execute
    Block,
}

impl AdmissionDecision {
    /// Whether the external call may run
    pub fn is_admitted(&self) -> bool {
        !matches!(self, AdmissionDecision::Block)
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionDecision::Admit => "admit",
            AdmissionDecision::AdmitFlagged => "admit_flagged",
            AdmissionDecision::Block => "block",
        }
    }
}

impl fmt::Display for AdmissionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk assessment result
///
/// Transient per request; embedded into the audit record of admitted and
/// blocked calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Pre-execution cost estimate
    pub estimated_cost: Decimal,

    /// Usage before this request (`limit - balance`)
    pub current_usage: Decimal,

    /// Configured spend limit
    pub limit: Decimal,

    /// `current_usage / limit * 100`
    pub current_usage_percent: Decimal,

    /// `(current_usage + estimated_cost) / limit * 100`
    pub budget_impact_percent: Decimal,

    /// Risk tier
    pub risk_level: RiskLevel,

    /// Admission verdict
    pub decision: AdmissionDecision,
}

impl RiskAssessment {
    /// Whether the external call may run
    pub fn is_admitted(&self) -> bool {
        self.decision.is_admitted()
    }
}
