//! Yahoo Finance data fetcher
//!
//! Fetches free option-chain data through Yahoo Finance's unofficial JSON API.
//!
//! Note: This is for educational/research purposes. Yahoo Finance
//! data is delayed ~15 minutes and intended for personal use.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::provider::{ExpiryFilter, MarketDataProvider};
use crate::core::{ContractQuote, OptionType, OptionsError, OptionsResult};

/// 13-week T-bill index, quoted in percent
pub const TREASURY_PROXY_SYMBOL: &str = "^IRX";

/// Lowest rate accepted from the treasury proxy
pub const MIN_RISK_FREE_RATE: f64 = 0.01;

/// Yahoo Finance API client
pub struct YahooClient {
    client: reqwest::blocking::Client,
    base_url: String,
    request_delay: Duration,
}

impl YahooClient {
    pub fn new() -> OptionsResult<Self> {
        Self::with_settings(Duration::from_secs(15), Duration::from_millis(1000))
    }

    /// `request_delay` is slept between consecutive chain requests
    pub fn with_settings(timeout: Duration, request_delay: Duration) -> OptionsResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(timeout)
            .build()
            .map_err(|e| OptionsError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: "https://query1.finance.yahoo.com/v7/finance".to_string(),
            request_delay,
        })
    }

    /// Point the client at a different host (mirrors, local stubs)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> OptionsResult<T> {
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send().map_err(|e| {
            // Connect and timeout failures are worth retrying
            OptionsError::Network(e.to_string())
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(OptionsError::RateLimited(format!("{} returned 429", url)));
        }
        if status.is_server_error() {
            return Err(OptionsError::Network(format!("{} returned {}", url, status)));
        }
        if !status.is_success() {
            return Err(OptionsError::data(format!("{} returned {}", url, status)));
        }

        response
            .json()
            .map_err(|e| OptionsError::data(format!("failed to parse response: {}", e)))
    }

    /// Get current price for a symbol
    pub fn get_quote(&self, symbol: &str) -> OptionsResult<f64> {
        let url = format!("{}/quote?symbols={}", self.base_url, symbol);
        let response: YahooQuoteResponse = self.get_json(&url)?;

        let result = response
            .quote_response
            .result
            .into_iter()
            .next()
            .ok_or_else(|| OptionsError::data(format!("no quote data returned for {}", symbol)))?;

        result
            .regular_market_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| OptionsError::data(format!("no market price for {}", symbol)))
    }

    /// Get available option expiration dates
    pub fn get_expirations(&self, symbol: &str) -> OptionsResult<Vec<NaiveDate>> {
        let url = format!("{}/options/{}", self.base_url, symbol);
        let chain = self.get_chain_data(&url, symbol)?;

        Ok(chain
            .expiration_dates
            .iter()
            .filter_map(|&ts| DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()))
            .collect())
    }

    /// Get option chain for a specific expiration
    pub fn get_option_chain(
        &self,
        symbol: &str,
        expiry: NaiveDate,
    ) -> OptionsResult<Vec<ContractQuote>> {
        // Yahoo keys expiries by midnight UTC
        let expiry_ts = expiry
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| OptionsError::data(format!("invalid expiry {}", expiry)))?;

        let url = format!("{}/options/{}?date={}", self.base_url, symbol, expiry_ts);
        let chain = self.get_chain_data(&url, symbol)?;

        let mut quotes = Vec::new();
        if let Some(options) = chain.options.first() {
            for call in &options.calls {
                if let Some(q) = convert_option_quote(call, symbol, expiry, OptionType::Call) {
                    quotes.push(q);
                }
            }
            for put in &options.puts {
                if let Some(q) = convert_option_quote(put, symbol, expiry, OptionType::Put) {
                    quotes.push(q);
                }
            }
        }

        Ok(quotes)
    }

    fn get_chain_data(&self, url: &str, symbol: &str) -> OptionsResult<YahooOptionChainData> {
        let response: YahooOptionsResponse = self.get_json(url)?;
        response
            .option_chain
            .result
            .into_iter()
            .next()
            .ok_or_else(|| OptionsError::data(format!("no options data returned for {}", symbol)))
    }
}

impl MarketDataProvider for YahooClient {
    fn underlying_price(&self, symbol: &str) -> OptionsResult<f64> {
        self.get_quote(symbol)
    }

    fn option_quotes(
        &self,
        symbol: &str,
        filter: &ExpiryFilter,
    ) -> OptionsResult<Vec<ContractQuote>> {
        let expiries = filter.select(&self.get_expirations(symbol)?);
        if expiries.is_empty() {
            return Err(OptionsError::data(format!("no option expirations for {}", symbol)));
        }

        let mut quotes = Vec::new();
        for (i, expiry) in expiries.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                thread::sleep(self.request_delay);
            }

            match self.get_option_chain(symbol, *expiry) {
                Ok(chain) => {
                    tracing::info!("Fetched {} contracts for {} {}", chain.len(), symbol, expiry);
                    quotes.extend(chain);
                }
                // Rate limiting applies to the whole symbol; let the caller retry
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => tracing::warn!("Failed to get chain for {} {}: {}", symbol, expiry, e),
            }
        }

        Ok(quotes)
    }

    fn risk_free_rate(&self) -> OptionsResult<f64> {
        let pct = self.get_quote(TREASURY_PROXY_SYMBOL)?;
        Ok((pct / 100.0).max(MIN_RISK_FREE_RATE))
    }
}

/// Convert Yahoo option data to our quote format
fn convert_option_quote(
    data: &YahooOptionData,
    underlying: &str,
    expiry: NaiveDate,
    option_type: OptionType,
) -> Option<ContractQuote> {
    let strike = data.strike.filter(|k| *k > 0.0)?;
    let contract_id = data
        .contract_symbol
        .clone()
        .unwrap_or_else(|| ContractQuote::occ_symbol(underlying, expiry, option_type, strike));

    let mut quote = ContractQuote::new(underlying, contract_id, option_type, strike, expiry);
    quote.bid = data.bid;
    quote.ask = data.ask;
    quote.last_price = data.last_price;
    quote.implied_volatility = data.implied_volatility;
    quote.volume = data.volume.unwrap_or(0).max(0) as u64;
    quote.open_interest = data.open_interest.unwrap_or(0).max(0) as u64;
    Some(quote)
}

// Yahoo Finance API response structures

#[derive(Debug, Deserialize)]
struct YahooQuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: YahooQuoteResult,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteResult {
    result: Vec<YahooQuoteData>,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteData {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YahooOptionsResponse {
    #[serde(rename = "optionChain")]
    option_chain: YahooOptionChain,
}

#[derive(Debug, Deserialize)]
struct YahooOptionChain {
    result: Vec<YahooOptionChainData>,
}

#[derive(Debug, Deserialize)]
struct YahooOptionChainData {
    #[serde(rename = "expirationDates", default)]
    expiration_dates: Vec<i64>,
    #[serde(default)]
    options: Vec<YahooOptions>,
}

#[derive(Debug, Deserialize)]
struct YahooOptions {
    #[serde(default)]
    calls: Vec<YahooOptionData>,
    #[serde(default)]
    puts: Vec<YahooOptionData>,
}

#[derive(Debug, Deserialize)]
struct YahooOptionData {
    #[serde(rename = "contractSymbol")]
    contract_symbol: Option<String>,
    strike: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
    #[serde(rename = "lastPrice")]
    last_price: Option<f64>,
    volume: Option<i64>,
    #[serde(rename = "openInterest")]
    open_interest: Option<i64>,
    #[serde(rename = "impliedVolatility")]
    implied_volatility: Option<f64>,
}
