//! Implied volatility solver
//!
//! Newton-Raphson with a bisection fallback over a fixed volatility bracket.
//! Prices outside what the bracket can produce are rejected up front, so the
//! fallback always has a sign change to work with.

use serde::{Deserialize, Serialize};

use super::black_scholes::{d1, norm_pdf, price_unchecked};
use crate::core::{OptionParameters, OptionsError, OptionsResult};

/// Solver bracket and stopping rules
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IvSolverConfig {
    /// Lowest volatility searched
    pub lower: f64,
    /// Highest volatility searched
    pub upper: f64,
    /// Stop when |model - market| falls below this
    pub price_tolerance: f64,
    /// Stop bisection when the bracket is narrower than this
    pub vol_tolerance: f64,
    /// Iteration cap, applied separately to each phase
    pub max_iterations: usize,
}

impl Default for IvSolverConfig {
    fn default() -> Self {
        Self {
            lower: 0.001,
            upper: 5.0,
            price_tolerance: 1e-8,
            vol_tolerance: 1e-10,
            max_iterations: 100,
        }
    }
}

impl IvSolverConfig {
    /// Bracket must be positive and ordered, tolerances non-negative
    pub fn validate(&self) -> OptionsResult<()> {
        if !(self.lower.is_finite() && self.upper.is_finite())
            || self.lower <= 0.0
            || self.upper <= self.lower
        {
            return Err(OptionsError::invalid_parameter(format!(
                "volatility bracket [{}, {}] must satisfy 0 < lower < upper",
                self.lower, self.upper
            )));
        }
        if !(self.price_tolerance >= 0.0 && self.vol_tolerance >= 0.0) {
            return Err(OptionsError::invalid_parameter(
                "solver tolerances must be non-negative",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IvSolver {
    config: IvSolverConfig,
}

impl IvSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: IvSolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IvSolverConfig {
        &self.config
    }

    /// Volatility that reproduces `market_price`. The volatility already in
    /// `params` is ignored.
    pub fn solve(&self, params: &OptionParameters, market_price: f64) -> OptionsResult<f64> {
        let cfg = &self.config;
        cfg.validate()?;

        if !market_price.is_finite() || market_price <= 0.0 {
            return Err(OptionsError::invalid_parameter(format!(
                "market price must be positive, got {}",
                market_price
            )));
        }
        params.with_volatility(cfg.lower).validate()?;
        if params.time_to_expiry <= 0.0 {
            return Err(OptionsError::invalid_parameter(
                "implied volatility is undefined at expiry",
            ));
        }

        let model = |vol: f64| price_unchecked(&params.with_volatility(vol));

        let floor = model(cfg.lower);
        let ceiling = model(cfg.upper);
        if market_price < floor - cfg.price_tolerance {
            return Err(OptionsError::no_arbitrage_bound(format!(
                "price {:.6} below minimum {:.6} attainable at vol {}",
                market_price, floor, cfg.lower
            )));
        }
        if market_price > ceiling + cfg.price_tolerance {
            return Err(OptionsError::no_arbitrage_bound(format!(
                "price {:.6} above maximum {:.6} attainable at vol {}",
                market_price, ceiling, cfg.upper
            )));
        }

        if let Some(vol) = self.newton(params, market_price, &model) {
            return Ok(vol);
        }

        self.bisection(market_price, &model)
    }

    fn newton(
        &self,
        params: &OptionParameters,
        market_price: f64,
        model: &impl Fn(f64) -> f64,
    ) -> Option<f64> {
        let cfg = &self.config;
        let OptionParameters {
            spot,
            strike,
            time_to_expiry: time,
            rate,
            dividend_yield: div,
            ..
        } = *params;

        // Brenner-Subrahmanyam initial guess
        let guess = market_price / (0.4 * spot * time.sqrt());
        let mut vol = guess.max(cfg.lower.max(0.01)).min(cfg.upper.min(3.0));

        for _ in 0..cfg.max_iterations {
            let diff = model(vol) - market_price;
            if diff.abs() < cfg.price_tolerance {
                return Some(vol);
            }

            // Vega for Newton step
            let d1 = d1(spot, strike, rate, div, vol, time);
            let vega = spot * (-div * time).exp() * norm_pdf(d1) * time.sqrt();
            if vega.abs() < 1e-12 {
                return None;
            }

            let next = vol - diff / vega;
            if !(cfg.lower..=cfg.upper).contains(&next) {
                return None;
            }
            vol = next;
        }

        None
    }

    fn bisection(&self, market_price: f64, model: &impl Fn(f64) -> f64) -> OptionsResult<f64> {
        let cfg = &self.config;
        let mut low = cfg.lower;
        let mut high = cfg.upper;

        for _ in 0..cfg.max_iterations {
            let mid = 0.5 * (low + high);
            let diff = model(mid) - market_price;

            if diff.abs() < cfg.price_tolerance || (high - low) < cfg.vol_tolerance {
                return Ok(mid);
            }

            if diff > 0.0 {
                high = mid;
            } else {
                low = mid;
            }
        }

        Err(OptionsError::convergence(format!(
            "no solution within {} iterations (bracket [{:.6}, {:.6}])",
            cfg.max_iterations, low, high
        )))
    }
}

/// Solve with the default bracket and tolerances
pub fn implied_volatility(params: &OptionParameters, market_price: f64) -> OptionsResult<f64> {
    IvSolver::new().solve(params, market_price)
}
