//! Risk Engine for the governance proxy
//!
//! Pure, I/O-free policy used before an external AI call is admitted:
//!
//! - [`CostEstimator`] prices a payload from its size
//! - [`RiskAssessor`] projects budget usage and decides admit / block

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod types;
pub mod cost;
pub mod limits;
pub mod scoring;

pub use error::{Error, Result};
pub use types::*;
pub use cost::{CostConfig, CostEstimator, SizeUnit};
pub use limits::RiskThresholds;
pub use scoring::RiskAssessor;
