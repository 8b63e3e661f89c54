//! Pricing models
//!
//! Implements:
//! - Black-Scholes (closed-form price and Greeks)
//! - Implied volatility solver

pub mod black_scholes;
pub mod implied_vol;

pub use black_scholes::*;
pub use implied_vol::*;
