//! In-memory market data provider
//!
//! Serves fixed spots and chains, with optional scripted failures, so the
//! fetcher and detector can run without the network.

use std::cell::RefCell;
use std::collections::HashMap;

use super::provider::{ExpiryFilter, MarketDataProvider};
use crate::core::{ContractQuote, OptionsError, OptionsResult};

/// Error flavour a scripted failure produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Network,
    Data,
}

impl FailureKind {
    fn to_error(self, symbol: &str) -> OptionsError {
        match self {
            FailureKind::RateLimited => {
                OptionsError::RateLimited(format!("scripted rate limit for {}", symbol))
            }
            FailureKind::Network => {
                OptionsError::Network(format!("scripted network failure for {}", symbol))
            }
            FailureKind::Data => OptionsError::data(format!("scripted bad data for {}", symbol)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScriptedFailure {
    kind: FailureKind,
    /// None fails forever
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
pub struct StaticProvider {
    spots: HashMap<String, f64>,
    chains: HashMap<String, Vec<ContractQuote>>,
    rate: Option<f64>,
    failures: RefCell<HashMap<String, ScriptedFailure>>,
    calls: RefCell<HashMap<String, usize>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_symbol(
        mut self,
        symbol: impl Into<String>,
        spot: f64,
        quotes: Vec<ContractQuote>,
    ) -> Self {
        let symbol = symbol.into();
        self.spots.insert(symbol.clone(), spot);
        self.chains.insert(symbol, quotes);
        self
    }

    /// Every request for `symbol` fails
    pub fn fail_always(self, symbol: impl Into<String>, kind: FailureKind) -> Self {
        self.script(symbol.into(), kind, None)
    }

    /// The next `times` requests for `symbol` fail, later ones succeed
    pub fn fail_times(self, symbol: impl Into<String>, kind: FailureKind, times: usize) -> Self {
        self.script(symbol.into(), kind, Some(times))
    }

    fn script(self, symbol: String, kind: FailureKind, remaining: Option<usize>) -> Self {
        self.failures
            .borrow_mut()
            .insert(symbol, ScriptedFailure { kind, remaining });
        self
    }

    /// Requests made for `symbol` so far
    pub fn call_count(&self, symbol: &str) -> usize {
        self.calls.borrow().get(symbol).copied().unwrap_or(0)
    }

    fn record_call(&self, symbol: &str) -> OptionsResult<()> {
        *self.calls.borrow_mut().entry(symbol.to_string()).or_insert(0) += 1;

        let mut failures = self.failures.borrow_mut();
        let Some(failure) = failures.get_mut(symbol) else {
            return Ok(());
        };

        match failure.remaining {
            None => Err(failure.kind.to_error(symbol)),
            Some(0) => Ok(()),
            Some(n) => {
                failure.remaining = Some(n - 1);
                Err(failure.kind.to_error(symbol))
            }
        }
    }
}

impl MarketDataProvider for StaticProvider {
    fn underlying_price(&self, symbol: &str) -> OptionsResult<f64> {
        self.record_call(symbol)?;
        self.spots
            .get(symbol)
            .copied()
            .ok_or_else(|| OptionsError::data(format!("unknown symbol {}", symbol)))
    }

    fn option_quotes(
        &self,
        symbol: &str,
        filter: &ExpiryFilter,
    ) -> OptionsResult<Vec<ContractQuote>> {
        self.record_call(symbol)?;
        let chain = self
            .chains
            .get(symbol)
            .ok_or_else(|| OptionsError::data(format!("unknown symbol {}", symbol)))?;

        let listed: Vec<_> = chain.iter().map(|q| q.expiry).collect();
        let selected = filter.select(&listed);

        Ok(chain
            .iter()
            .filter(|q| selected.contains(&q.expiry))
            .cloned()
            .collect())
    }

    fn risk_free_rate(&self) -> OptionsResult<f64> {
        self.rate
            .ok_or_else(|| OptionsError::data("no risk-free rate configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OptionType;
    use chrono::NaiveDate;

    fn quote(expiry_day: u32) -> ContractQuote {
        let expiry = NaiveDate::from_ymd_opt(2025, 7, expiry_day).unwrap();
        ContractQuote::new("SPY", format!("SPY-{}", expiry_day), OptionType::Call, 450.0, expiry)
    }

    #[test]
    fn test_serves_fixture_data() {
        let provider =
            StaticProvider::new().with_symbol("SPY", 445.5, vec![quote(3), quote(10), quote(17)]);

        assert_eq!(provider.underlying_price("SPY").unwrap(), 445.5);

        let filter = ExpiryFilter {
            max_expirations: Some(2),
            ..Default::default()
        };
        let quotes = provider.option_quotes("SPY", &filter).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(provider.call_count("SPY"), 2);

        assert!(provider.underlying_price("QQQ").is_err());
        assert!(provider.risk_free_rate().is_err());
    }

    #[test]
    fn test_scripted_failures() {
        let provider = StaticProvider::new()
            .with_symbol("SPY", 445.5, vec![])
            .fail_times("SPY", FailureKind::RateLimited, 2);

        assert!(matches!(
            provider.underlying_price("SPY"),
            Err(OptionsError::RateLimited(_))
        ));
        assert!(provider.underlying_price("SPY").is_err());
        assert!(provider.underlying_price("SPY").is_ok());

        let broken = StaticProvider::new()
            .with_symbol("TSLA", 185.0, vec![])
            .fail_always("TSLA", FailureKind::Data);
        for _ in 0..5 {
            assert!(matches!(broken.underlying_price("TSLA"), Err(OptionsError::Data(_))));
        }
    }
}
