//! Budget-impact risk assessment

use crate::{Error, Result, RiskAssessment, RiskLevel, RiskThresholds};
use rust_decimal::Decimal;
use tracing::debug;

/// Decimal places kept on the reported percentages
const PERCENT_SCALE: u32 = 4;

/// Risk assessor
///
/// Usage is measured as `limit - balance`, so a balance above the limit
/// (after an admin credit) yields negative usage and always admits.
#[derive(Debug, Clone, Copy)]
pub struct RiskAssessor {
    limit: Decimal,
    thresholds: RiskThresholds,
}

impl RiskAssessor {
    /// Create new assessor
    pub fn new(limit: Decimal, thresholds: RiskThresholds) -> Result<Self> {
        if limit <= Decimal::ZERO {
            return Err(Error::InvalidConfig(format!(
                "spend limit must be positive, got {}",
                limit
            )));
        }
        thresholds.validate()?;
        Ok(Self { limit, thresholds })
    }

    /// Configured spend limit
    pub fn limit(&self) -> Decimal {
        self.limit
    }

    /// Configured thresholds
    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Assess a request against the configured limit
    pub fn assess(&self, current_balance: Decimal, estimated_cost: Decimal) -> Result<RiskAssessment> {
        self.assess_against(current_balance, estimated_cost, self.limit)
    }

    /// Assess a request against an explicit limit
    pub fn assess_against(
        &self,
        current_balance: Decimal,
        estimated_cost: Decimal,
        limit: Decimal,
    ) -> Result<RiskAssessment> {
        if limit <= Decimal::ZERO {
            return Err(Error::InvalidInput(format!("limit must be positive, got {}", limit)));
        }
        if estimated_cost < Decimal::ZERO {
            return Err(Error::InvalidInput(format!(
                "estimated cost must not be negative, got {}",
                estimated_cost
            )));
        }

        let current_usage = limit
            .checked_sub(current_balance)
            .ok_or_else(|| Error::Calculation("usage overflow".to_string()))?;
        let projected_usage = current_usage
            .checked_add(estimated_cost)
            .ok_or_else(|| Error::Calculation("projected usage overflow".to_string()))?;

        let current_usage_percent = percent_of(current_usage, limit)?;
        let budget_impact_percent = percent_of(projected_usage, limit)?;

        // The block rule is decided on exact amounts, not on the rounded percentage
        let risk_level = if projected_usage > limit {
            RiskLevel::Critical
        } else {
            self.thresholds
                .classify(budget_impact_percent.min(Decimal::ONE_HUNDRED))
        };

        debug!(
            %estimated_cost,
            %current_usage,
            %budget_impact_percent,
            risk_level = %risk_level,
            "Risk assessed"
        );

        Ok(RiskAssessment {
            estimated_cost,
            current_usage,
            limit,
            current_usage_percent: current_usage_percent.round_dp(PERCENT_SCALE),
            budget_impact_percent: budget_impact_percent.round_dp(PERCENT_SCALE),
            risk_level,
            decision: risk_level.decision(),
        })
    }
}

fn percent_of(value: Decimal, limit: Decimal) -> Result<Decimal> {
    value
        .checked_div(limit)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or_else(|| Error::Calculation(format!("percentage overflow for {} / {}", value, limit)))
}
