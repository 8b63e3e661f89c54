//! Market data provider capability
//!
//! Everything the fetcher needs from the outside world. Implemented by
//! [`super::YahooClient`] for live data and [`super::StaticProvider`] for
//! fixtures.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::{ContractQuote, OptionsResult};

/// Which listed expiries to fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiryFilter {
    /// Fetch at most this many expiries, nearest first
    pub max_expirations: Option<usize>,
    /// Earliest expiry to include
    pub from: Option<NaiveDate>,
    /// Latest expiry to include
    pub to: Option<NaiveDate>,
}

impl Default for ExpiryFilter {
    fn default() -> Self {
        Self {
            max_expirations: Some(3),
            from: None,
            to: None,
        }
    }
}

impl ExpiryFilter {
    /// No limits at all
    pub fn all() -> Self {
        Self {
            max_expirations: None,
            from: None,
            to: None,
        }
    }

    pub fn contains(&self, expiry: NaiveDate) -> bool {
        self.from.map_or(true, |from| expiry >= from) && self.to.map_or(true, |to| expiry <= to)
    }

    /// Apply the date range and count limit to a list of listed expiries
    pub fn select(&self, expiries: &[NaiveDate]) -> Vec<NaiveDate> {
        let mut selected: Vec<NaiveDate> = expiries
            .iter()
            .copied()
            .filter(|e| self.contains(*e))
            .collect();
        selected.sort();
        selected.dedup();
        if let Some(max) = self.max_expirations {
            selected.truncate(max);
        }
        selected
    }
}

/// Source of spot prices, option chains, and a risk-free proxy
pub trait MarketDataProvider {
    /// Current price of the underlying
    fn underlying_price(&self, symbol: &str) -> OptionsResult<f64>;

    /// Option chain rows for the expiries selected by `filter`
    fn option_quotes(
        &self,
        symbol: &str,
        filter: &ExpiryFilter,
    ) -> OptionsResult<Vec<ContractQuote>>;

    /// Annualized risk-free rate estimate (decimal)
    fn risk_free_rate(&self) -> OptionsResult<f64>;
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for &P {
    fn underlying_price(&self, symbol: &str) -> OptionsResult<f64> {
        (**self).underlying_price(symbol)
    }

    fn option_quotes(
        &self,
        symbol: &str,
        filter: &ExpiryFilter,
    ) -> OptionsResult<Vec<ContractQuote>> {
        (**self).option_quotes(symbol, filter)
    }

    fn risk_free_rate(&self) -> OptionsResult<f64> {
        (**self).risk_free_rate()
    }
}
