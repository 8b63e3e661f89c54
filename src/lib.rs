//! # Option Variance - Market vs Black-Scholes Analytics
//!
//! Prices listed equity options with Black-Scholes, compares the model to
//! what the market is quoting, and flags the contracts that deviate most.
//!
//! ## Overview
//!
//! - **Pricing**: closed-form Black-Scholes with continuous dividend yield,
//!   Greeks, and an implied volatility solver
//! - **Market data**: Yahoo Finance option chains behind a provider trait,
//!   fetched per symbol with retry and backoff
//! - **Detection**: signed variance% of market over theoretical, thresholded
//!   and ranked by magnitude
//! - **Persistence**: append-only SQLite history of every priced contract,
//!   with the threshold reapplied when reading it back
//!
//! ## Usage
//!
//! ```rust,no_run
//! use option_variance::prelude::*;
//!
//! // Price a one-year ATM call
//! let params = OptionParameters::new(100.0, 100.0, 1.0, 0.05, 0.2, OptionType::Call);
//! let price = bs_price(&params).unwrap();
//!
//! // Scan a few symbols and keep the results
//! let fetcher = MarketDataFetcher::new(YahooClient::new().unwrap());
//! let analyzer = VarianceAnalyzer::new(fetcher, VarianceDetector::new());
//! let mut store = ResultStore::open("option_variance.db").unwrap();
//! store.init_schema().unwrap();
//!
//! let symbols = vec!["SPY".to_string(), "AAPL".to_string()];
//! let report = analyzer
//!     .run(&symbols, &ExpiryFilter::default(), Some(&mut store))
//!     .unwrap();
//! for record in &report.records {
//!     println!("{} {:+.1}%", record.quote.contract_id, record.variance_pct);
//! }
//! ```
//!
//! ## What This Does NOT Do
//!
//! - Price American exercise (European formulas throughout)
//! - Model the volatility surface; each contract is priced at its own IV
//! - Generate trading signals beyond the variance ranking

pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod data;
pub mod detector;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod sample;
pub mod store;

/// Prelude with commonly used types
pub mod prelude {
    // Core types
    pub use crate::core::{
        AnalysisRecord, ContractQuote, Greeks, OptionParameters, OptionType, OptionsError,
        OptionsResult, PricingDirection,
    };

    // Models
    pub use crate::models::{
        greeks as bs_greeks, implied_volatility, norm_cdf, norm_pdf, price as bs_price,
        IvSolver, IvSolverConfig,
    };

    // Data fetching
    pub use crate::data::{
        ExpiryFilter, FetchReport, FetcherConfig, MarketDataFetcher, MarketDataProvider,
        RetryPolicy, StaticProvider, YahooClient,
    };

    // Detection
    pub use crate::detector::{variance_pct, Detection, DetectorConfig, VarianceDetector};

    // Pipeline and storage
    pub use crate::config::AnalyzerConfig;
    pub use crate::pipeline::{RunReport, VarianceAnalyzer};
    pub use crate::store::{IvPoint, RecordQuery, ResultStore, StoreSummary};
}

// Re-export main types at crate root
pub use crate::core::{OptionsError, OptionsResult};
pub use crate::pipeline::VarianceAnalyzer;
