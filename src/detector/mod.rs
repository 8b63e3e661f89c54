//! Market-vs-model variance detection
//!
//! Prices every fetched quote with Black-Scholes (using the quote's own
//! implied volatility), measures how far the market sits from the model, and
//! ranks the contracts that deviate by more than a threshold.
//!
//! ## Pipeline
//!
//! 1. **Screen**: drop expired, far-dated, untraded, or unpriced quotes
//! 2. **Price**: theoretical value from the quote's strike/expiry/IV
//! 3. **Compare**: signed variance% = (market - theoretical) / theoretical * 100
//! 4. **Rank**: keep |variance%| >= threshold, largest first

pub mod config;
pub mod variance;

pub use config::*;
pub use variance::*;

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::AnalysisRecord;

/// Signed percentage deviation of market from theoretical price.
///
/// `None` when the theoretical price is not strictly positive (the ratio is
/// undefined) or either input is not finite.
pub fn variance_pct(market_price: f64, theoretical_price: f64) -> Option<f64> {
    if !market_price.is_finite() || !theoretical_price.is_finite() || theoretical_price <= 0.0 {
        return None;
    }
    Some((market_price - theoretical_price) / theoretical_price * 100.0)
}

/// Largest |variance%| first, then higher open interest, then contract id
pub fn compare_by_variance(a: &AnalysisRecord, b: &AnalysisRecord) -> Ordering {
    b.abs_variance()
        .total_cmp(&a.abs_variance())
        .then_with(|| b.quote.open_interest.cmp(&a.quote.open_interest))
        .then_with(|| a.quote.contract_id.cmp(&b.quote.contract_id))
}

/// Sort records into detection order
pub fn rank_records(records: &mut [AnalysisRecord]) {
    records.sort_by(compare_by_variance);
}

/// Why a quote produced no record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    Expired,
    TooFarOut { days: i64 },
    NoMarketPrice,
    LowVolume { volume: u64 },
    MissingVolatility,
    Pricing(String),
    DegenerateTheoretical { theoretical: f64 },
    ExtremeVariance { variance_pct: f64 },
}

impl SkipReason {
    /// Short stable label for grouping
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Expired => "expired",
            SkipReason::TooFarOut { .. } => "too_far_out",
            SkipReason::NoMarketPrice => "no_market_price",
            SkipReason::LowVolume { .. } => "low_volume",
            SkipReason::MissingVolatility => "missing_iv",
            SkipReason::Pricing(_) => "pricing_error",
            SkipReason::DegenerateTheoretical { .. } => "degenerate_theoretical",
            SkipReason::ExtremeVariance { .. } => "extreme_variance",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Expired => write!(f, "expired"),
            SkipReason::TooFarOut { days } => write!(f, "expires in {} days", days),
            SkipReason::NoMarketPrice => write!(f, "no market price"),
            SkipReason::LowVolume { volume } => write!(f, "volume {}", volume),
            SkipReason::MissingVolatility => write!(f, "no implied volatility"),
            SkipReason::Pricing(msg) => write!(f, "pricing failed: {}", msg),
            SkipReason::DegenerateTheoretical { theoretical } => {
                write!(f, "theoretical price {:.4} too small", theoretical)
            }
            SkipReason::ExtremeVariance { variance_pct } => {
                write!(f, "variance {:.1}% out of range", variance_pct)
            }
        }
    }
}

/// A quote the detector could not turn into a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedContract {
    pub symbol: String,
    pub contract_id: String,
    pub reason: SkipReason,
}

/// Every priceable quote, before thresholding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Evaluation {
    pub records: Vec<AnalysisRecord>,
    pub skipped: Vec<SkippedContract>,
}

/// Flagged records in rank order, plus everything that was priced
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Detection {
    /// |variance%| >= threshold, ranked
    pub records: Vec<AnalysisRecord>,
    /// Every priced record, ranked; a superset of `records`
    pub priced: Vec<AnalysisRecord>,
    pub skipped: Vec<SkippedContract>,
    /// Quotes successfully priced
    pub evaluated: usize,
    /// Priced quotes under the threshold
    pub below_threshold: usize,
}

impl Detection {
    /// Fold another detection in and re-rank
    pub fn merge(&mut self, other: Detection) {
        self.records.extend(other.records);
        self.priced.extend(other.priced);
        self.skipped.extend(other.skipped);
        self.evaluated += other.evaluated;
        self.below_threshold += other.below_threshold;
        rank_records(&mut self.records);
        rank_records(&mut self.priced);
    }
}
