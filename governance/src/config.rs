//! Configuration for governed execution

use crate::redact::AuditContentMode;
use crate::{Error, Result};
use risk_engine::{CostConfig, CostEstimator, RiskAssessor, RiskThresholds};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Governance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name, used in logs
    pub service_name: String,

    /// Ledger store
    pub ledger: ledger_core::Config,

    /// Spend limit; defaults to the initial budget
    #[serde(
        with = "rust_decimal::serde::str_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub budget_limit: Option<Decimal>,

    /// Cost estimation
    pub cost: CostConfig,

    /// Risk tier thresholds
    pub thresholds: RiskThresholds,

    /// External call timeout (milliseconds)
    pub execution_timeout_ms: u64,

    /// Largest accepted payload, in characters
    pub max_payload_chars: usize,

    /// What the audit record stores for input and output
    pub audit_content: AuditContentMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "governance".to_string(),
            ledger: ledger_core::Config {
                initial_budget: Decimal::from(1000),
                ..ledger_core::Config::default()
            },
            budget_limit: None,
            cost: CostConfig::default(),
            thresholds: RiskThresholds::default(),
            execution_timeout_ms: 30_000,
            max_payload_chars: 100_000,
            audit_content: AuditContentMode::default(),
        }
    }
}

impl Config {
    /// Load from a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `GOVERNANCE_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(data_dir) = std::env::var("GOVERNANCE_DATA_DIR") {
            self.ledger.data_dir = PathBuf::from(data_dir);
        }
        if let Some(budget) = env_decimal("GOVERNANCE_INITIAL_BUDGET")? {
            self.ledger.initial_budget = budget;
        }
        if let Some(limit) = env_decimal("GOVERNANCE_BUDGET_LIMIT")? {
            self.budget_limit = Some(limit);
        }
        if let Some(price) = env_decimal("GOVERNANCE_UNIT_PRICE")? {
            self.cost.unit_price = price;
        }
        if let Ok(timeout) = std::env::var("GOVERNANCE_EXECUTION_TIMEOUT_MS") {
            self.execution_timeout_ms = timeout
                .parse()
                .map_err(|e| Error::Config(format!("GOVERNANCE_EXECUTION_TIMEOUT_MS: {}", e)))?;
        }
        Ok(())
    }

    /// Effective spend limit
    pub fn limit(&self) -> Decimal {
        self.budget_limit.unwrap_or(self.ledger.initial_budget)
    }

    /// External call timeout
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    /// Cost estimator for this configuration
    pub fn estimator(&self) -> Result<CostEstimator> {
        Ok(CostEstimator::from_config(&self.cost)?)
    }

    /// Risk assessor for this configuration
    pub fn assessor(&self) -> Result<RiskAssessor> {
        Ok(RiskAssessor::new(self.limit(), self.thresholds)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        self.ledger.validate()?;
        self.thresholds.validate()?;
        self.estimator()?;

        if self.limit() <= Decimal::ZERO {
            return Err(Error::Config(format!(
                "budget limit must be positive, got {}",
                self.limit()
            )));
        }
        if self.execution_timeout_ms == 0 {
            return Err(Error::Config(
                "execution_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.max_payload_chars == 0 {
            return Err(Error::Config(
                "max_payload_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_decimal(key: &str) -> Result<Option<Decimal>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.limit(), Decimal::from(1000));
        assert_eq!(config.cost.unit_price, Decimal::new(1, 1));
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            service_name = "gateway"
            budget_limit = "10.0"
            execution_timeout_ms = 500

            [ledger]
            data_dir = "/tmp/ledger"
            initial_budget = "10.0"

            [cost]
            unit_price = "0.01"
            unit = "chars"

            [thresholds]
            medium_percent = "40"
            high_percent = "90"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.limit(), Decimal::new(100, 1));
        assert_eq!(config.cost.unit_price, Decimal::new(1, 2));
        assert_eq!(config.thresholds.high_percent, Decimal::from(90));
        assert_eq!(config.execution_timeout(), Duration::from_millis(500));
        assert_eq!(config.audit_content, AuditContentMode::Masked);
    }

    #[test]
    fn test_limit_defaults_to_initial_budget() {
        let mut config = Config::default();
        config.ledger.initial_budget = Decimal::from(25);
        assert_eq!(config.limit(), Decimal::from(25));

        config.budget_limit = Some(Decimal::from(5));
        assert_eq!(config.limit(), Decimal::from(5));
    }

    #[test]
    fn test_rejects_non_positive_limit() {
        let config = Config {
            budget_limit: Some(Decimal::ZERO),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_negative_price() {
        let mut config = Config::default();
        config.cost.unit_price = Decimal::new(-1, 2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.thresholds.medium_percent = Decimal::from(90);
        config.thresholds.high_percent = Decimal::from(50);
        assert!(config.validate().is_err());
    }
}
