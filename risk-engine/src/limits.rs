//! Budget-impact thresholds

use crate::{Error, Result, RiskLevel};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ordered thresholds on `budget_impact_percent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// At or above this percent a request is `medium`
    #[serde(with = "rust_decimal::serde::str")]
    pub medium_percent: Decimal,

    /// At or above this percent (and within the limit) a request is `high`
    #[serde(with = "rust_decimal::serde::str")]
    pub high_percent: Decimal,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium_percent: Decimal::from(50),
            high_percent: Decimal::from(80),
        }
    }
}

impl RiskThresholds {
    /// Create thresholds, rejecting an inconsistent ordering
    pub fn new(medium_percent: Decimal, high_percent: Decimal) -> Result<Self> {
        let thresholds = Self {
            medium_percent,
            high_percent,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Check `0 <= medium <= high <= 100`
    pub fn validate(&self) -> Result<()> {
        let hundred = Decimal::ONE_HUNDRED;
        if self.medium_percent < Decimal::ZERO
            || self.medium_percent > self.high_percent
            || self.high_percent > hundred
        {
            return Err(Error::InvalidConfig(format!(
                "thresholds must satisfy 0 <= medium ({}) <= high ({}) <= 100",
                self.medium_percent, self.high_percent
            )));
        }
        Ok(())
    }

    /// Classify a projected impact percent
    ///
    /// Anything strictly above 100% is `critical`.
    pub fn classify(&self, impact_percent: Decimal) -> RiskLevel {
        if impact_percent > Decimal::ONE_HUNDRED {
            RiskLevel::Critical
        } else if impact_percent >= self.high_percent {
            RiskLevel::High
        } else if impact_percent >= self.medium_percent {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}
