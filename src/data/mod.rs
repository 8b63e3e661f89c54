//! Market data fetching
//!
//! Handles:
//! - The provider capability (spot, chain, risk-free proxy)
//! - Yahoo Finance API for live option chains (free)
//! - A static fixture provider for offline runs and tests
//! - Sequential batch fetching with retries

pub mod provider;
pub mod yahoo;
pub mod static_provider;
pub mod fetcher;

pub use provider::*;
pub use yahoo::*;
pub use static_provider::*;
pub use fetcher::*;
