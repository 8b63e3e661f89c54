//! Batch fetcher with retries and partial-failure semantics
//!
//! Symbols are fetched one after another. Transient provider errors are
//! retried with exponential backoff; a symbol that still fails is recorded
//! and skipped, never aborting the batch.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::provider::{ExpiryFilter, MarketDataProvider};
use crate::core::{ContractQuote, OptionsError, OptionsResult};

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            multiplier: 1.0,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(64) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let nanos = (self.initial_backoff.as_nanos() as f64 * factor)
            .min(self.max_backoff.as_nanos() as f64);
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Run `op`, retrying transient errors
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> OptionsResult<T>) -> OptionsResult<T> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.backoff(attempt);
                    debug!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what, attempt, attempts, e, delay
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Spot and chain for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub spot: f64,
    pub quotes: Vec<ContractQuote>,
}

/// A symbol that could not be fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub symbol: String,
    pub reason: String,
}

/// Outcome of a batch fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchReport {
    pub risk_free_rate: f64,
    pub snapshots: Vec<SymbolSnapshot>,
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    pub fn total_quotes(&self) -> usize {
        self.snapshots.iter().map(|s| s.quotes.len()).sum()
    }
}

/// Fetcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    pub retry: RetryPolicy,
    /// Rate used when the live proxy is disabled or unavailable
    pub risk_free_rate: f64,
    /// Ask the provider for a live rate
    pub live_rate: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            risk_free_rate: 0.05,
            live_rate: false,
        }
    }
}

pub struct MarketDataFetcher<P> {
    provider: P,
    config: FetcherConfig,
}

impl<P: MarketDataProvider> MarketDataFetcher<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, FetcherConfig::default())
    }

    pub fn with_config(provider: P, config: FetcherConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch every symbol; failures are collected, not returned
    pub fn fetch(&self, symbols: &[String], filter: &ExpiryFilter) -> FetchReport {
        let risk_free_rate = self.risk_free_rate();
        let mut snapshots = Vec::new();
        let mut failures = Vec::new();

        for symbol in normalize_symbols(symbols) {
            match self.fetch_symbol(&symbol, filter) {
                Ok(snapshot) => {
                    info!(
                        "Fetched {} contracts for {} (spot {:.2})",
                        snapshot.quotes.len(),
                        symbol,
                        snapshot.spot
                    );
                    snapshots.push(snapshot);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", symbol, e);
                    failures.push(FetchFailure {
                        symbol,
                        reason: e.to_string(),
                    });
                }
            }
        }

        FetchReport {
            risk_free_rate,
            snapshots,
            failures,
        }
    }

    /// Fetch one symbol, wrapping any exhausted failure as `DataUnavailable`
    pub fn fetch_symbol(
        &self,
        symbol: &str,
        filter: &ExpiryFilter,
    ) -> OptionsResult<SymbolSnapshot> {
        let unavailable = |e: OptionsError| OptionsError::data_unavailable(symbol, e.to_string());
        let retry = &self.config.retry;

        let spot = retry
            .run(&format!("{} spot", symbol), || self.provider.underlying_price(symbol))
            .map_err(unavailable)?;
        if !spot.is_finite() || spot <= 0.0 {
            return Err(OptionsError::data_unavailable(
                symbol,
                format!("invalid underlying price {}", spot),
            ));
        }

        let quotes = retry
            .run(&format!("{} chain", symbol), || {
                self.provider.option_quotes(symbol, filter)
            })
            .map_err(unavailable)?;

        Ok(SymbolSnapshot {
            symbol: symbol.to_string(),
            spot,
            quotes,
        })
    }

    /// Live proxy rate when enabled, otherwise (or on failure) the configured rate
    pub fn risk_free_rate(&self) -> f64 {
        if !self.config.live_rate {
            return self.config.risk_free_rate;
        }

        match self
            .config
            .retry
            .run("risk-free rate", || self.provider.risk_free_rate())
        {
            Ok(rate) if rate.is_finite() => {
                info!("Using live risk-free rate {:.4}", rate);
                rate
            }
            Ok(rate) => {
                warn!(
                    "Provider returned invalid rate {}; using {:.4}",
                    rate, self.config.risk_free_rate
                );
                self.config.risk_free_rate
            }
            Err(e) => {
                warn!(
                    "Could not fetch risk-free rate ({}); using {:.4}",
                    e, self.config.risk_free_rate
                );
                self.config.risk_free_rate
            }
        }
    }
}

/// Trim, upper-case, drop blanks and duplicates (first occurrence wins)
pub fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in symbols {
        let symbol = raw.trim().to_ascii_uppercase();
        if !symbol.is_empty() && !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}
