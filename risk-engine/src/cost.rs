//! Payload cost estimation
//!
//! Cost is a monotonic function of payload size scaled by a fixed unit
//! price. The same estimator prices the request before execution and the
//! combined input + output afterwards; only the latter is billed.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How payload size is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeUnit {
    /// Unicode scalar values
    Chars,
    /// UTF-8 bytes
    Bytes,
}

/// Cost configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Price per size unit
    #[serde(with = "rust_decimal::serde::str")]
    pub unit_price: Decimal,

    /// Size unit
    pub unit: SizeUnit,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            unit_price: Decimal::new(1, 1), // 0.1 per character
            unit: SizeUnit::Chars,
        }
    }
}

/// Deterministic cost estimator
#[derive(Debug, Clone, Copy)]
pub struct CostEstimator {
    unit_price: Decimal,
    unit: SizeUnit,
}

impl CostEstimator {
    /// Create new estimator
    pub fn new(unit_price: Decimal, unit: SizeUnit) -> Result<Self> {
        if unit_price < Decimal::ZERO {
            return Err(Error::InvalidConfig(format!(
                "unit price must not be negative, got {}",
                unit_price
            )));
        }
        Ok(Self { unit_price, unit })
    }

    /// Create from configuration
    pub fn from_config(config: &CostConfig) -> Result<Self> {
        Self::new(config.unit_price, config.unit)
    }

    /// Price per size unit
    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    /// Estimate the cost of a payload before execution
    pub fn estimate(&self, payload: &str) -> Result<Decimal> {
        self.price(self.size_of(payload))
    }

    /// Price the combined input and output of a finished call
    pub fn estimate_exchange(&self, input: &str, output: &str) -> Result<Decimal> {
        let size = self
            .size_of(input)
            .checked_add(self.size_of(output))
            .ok_or_else(|| Error::Calculation("payload size overflow".to_string()))?;
        self.price(size)
    }

    fn size_of(&self, text: &str) -> u64 {
        match self.unit {
            SizeUnit::Chars => text.chars().count() as u64,
            SizeUnit::Bytes => text.len() as u64,
        }
    }

    fn price(&self, size: u64) -> Result<Decimal> {
        Decimal::from(size)
            .checked_mul(self.unit_price)
            .ok_or_else(|| Error::Calculation(format!("cost overflow for size {}", size)))
    }
}

impl Default for CostEstimator {
    fn default() -> Self {
        let config = CostConfig::default();
        Self {
            unit_price: config.unit_price,
            unit: config.unit,
        }
    }
}
