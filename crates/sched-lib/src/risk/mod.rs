//! Predictive risk assessment
//!
//! Turns the snapshot history into per-resource risk levels, a storage
//! exhaustion projection and advisory mitigations.

mod engine;
mod trend;

pub use engine::{RiskEngine, UNKNOWN_RISK};
pub use trend::{
    fit_storage_trend, linear_regression_slope, StorageTrend, MIN_GROWTH_BYTES_PER_SEC,
};
