//! Option quote data
//!
//! Market rows as fetched from a provider, and the analysis records the
//! detector derives from them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::option::OptionType;

/// Days per year used for time-to-expiry
pub const DAYS_PER_YEAR: f64 = 365.25;

/// One fetched option-chain row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractQuote {
    /// Underlying symbol (e.g., "SPY")
    pub symbol: String,
    /// Exchange contract identifier (e.g., "SPY250620C00500000")
    pub contract_id: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiry: NaiveDate,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_price: Option<f64>,
    /// Implied volatility reported by the provider
    pub implied_volatility: Option<f64>,
    pub volume: u64,
    pub open_interest: u64,
}

impl ContractQuote {
    pub fn new(
        symbol: impl Into<String>,
        contract_id: impl Into<String>,
        option_type: OptionType,
        strike: f64,
        expiry: NaiveDate,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            contract_id: contract_id.into(),
            option_type,
            strike,
            expiry,
            bid: None,
            ask: None,
            last_price: None,
            implied_volatility: None,
            volume: 0,
            open_interest: 0,
        }
    }

    /// OCC-style contract symbol: SYMBOL + YYMMDD + C/P + strike*1000 (8 digits)
    pub fn occ_symbol(
        symbol: &str,
        expiry: NaiveDate,
        option_type: OptionType,
        strike: f64,
    ) -> String {
        let flag = match option_type {
            OptionType::Call => 'C',
            OptionType::Put => 'P',
        };
        format!(
            "{}{}{}{:08}",
            symbol,
            expiry.format("%y%m%d"),
            flag,
            (strike * 1000.0).round() as u64
        )
    }

    /// Mid price when both sides are positive
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) if b > 0.0 && a > 0.0 => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// Observed market price: mid when available, else a positive last price
    pub fn market_price(&self) -> Option<f64> {
        self.mid()
            .or(self.last_price.filter(|p| *p > 0.0 && p.is_finite()))
    }

    /// Calendar days until expiry (negative once expired)
    pub fn days_to_expiry(&self, as_of: NaiveDate) -> i64 {
        (self.expiry - as_of).num_days()
    }

    /// Time to expiry in years
    pub fn time_to_expiry(&self, as_of: NaiveDate) -> f64 {
        self.days_to_expiry(as_of) as f64 / DAYS_PER_YEAR
    }
}

/// Which way the market deviates from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingDirection {
    Overpriced,
    Underpriced,
}

impl PricingDirection {
    /// Classify by the sign of the variance. Zero counts as neither.
    pub fn from_variance(variance_pct: f64) -> Option<Self> {
        if variance_pct > 0.0 {
            Some(PricingDirection::Overpriced)
        } else if variance_pct < 0.0 {
            Some(PricingDirection::Underpriced)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PricingDirection::Overpriced => "overpriced",
            PricingDirection::Underpriced => "underpriced",
        }
    }
}

/// A priced quote, written once to the result store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub quote: ContractQuote,
    /// Underlying spot used for pricing
    pub underlying_price: f64,
    pub risk_free_rate: f64,
    pub time_to_expiry: f64,
    /// Price compared against the model
    pub market_price: f64,
    /// Black-Scholes price
    pub theoretical_price: f64,
    /// (market - theoretical) / theoretical * 100
    pub variance_pct: f64,
    /// Volatility implied by the market price, when the solver succeeds
    pub solved_iv: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn abs_variance(&self) -> f64 {
        self.variance_pct.abs()
    }

    pub fn direction(&self) -> Option<PricingDirection> {
        PricingDirection::from_variance(self.variance_pct)
    }
}
