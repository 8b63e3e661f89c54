//! Configuration for variance detection

use serde::{Deserialize, Serialize};

/// Configuration for variance detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum |variance%| for a contract to be flagged
    /// Default: 25.0
    pub threshold_pct: f64,

    /// Continuous dividend yield q used when pricing
    /// Default: 0.0
    pub dividend_yield: f64,

    /// Contracts trading fewer than this are skipped
    /// Default: 1 (drop untraded contracts)
    pub min_volume: u64,

    /// Contracts expiring further out than this are skipped
    /// Default: 730
    pub max_days_to_expiry: i64,

    /// Theoretical prices below this make variance% meaningless
    /// Default: 0.01 (one cent)
    pub min_theoretical_price: f64,

    /// |variance%| at or above this is treated as a data error
    /// Default: Some(1000.0)
    pub max_abs_variance_pct: Option<f64>,

    /// Solve implied vol from the market price for each record
    /// Default: true
    pub solve_implied_vol: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_pct: 25.0,
            dividend_yield: 0.0,
            min_volume: 1,
            max_days_to_expiry: 730,
            min_theoretical_price: 0.01,
            max_abs_variance_pct: Some(1000.0),
            solve_implied_vol: true,
        }
    }
}

impl DetectorConfig {
    pub fn with_threshold(threshold_pct: f64) -> Self {
        Self {
            threshold_pct,
            ..Default::default()
        }
    }
}
