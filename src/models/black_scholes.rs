//! Black-Scholes Model
//!
//! Provides:
//! - European option pricing with continuous dividend yield
//! - Greeks computation
//!
//! The implied volatility solver lives in [`super::implied_vol`].

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::erfc;

use crate::core::{Greeks, OptionParameters, OptionType, OptionsResult};

/// Standard normal CDF
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal PDF
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black-Scholes d1 parameter
pub fn d1(spot: f64, strike: f64, rate: f64, div: f64, vol: f64, time: f64) -> f64 {
    let forward = spot * ((rate - div) * time).exp();
    ((forward / strike).ln() + 0.5 * vol * vol * time) / (vol * time.sqrt())
}

/// Black-Scholes d2 parameter
pub fn d2(spot: f64, strike: f64, rate: f64, div: f64, vol: f64, time: f64) -> f64 {
    d1(spot, strike, rate, div, vol, time) - vol * time.sqrt()
}

/// Black-Scholes European option price
pub fn price(params: &OptionParameters) -> OptionsResult<f64> {
    params.validate()?;
    Ok(price_unchecked(params))
}

/// Price without re-validating; callers must have validated `params`
pub(crate) fn price_unchecked(params: &OptionParameters) -> f64 {
    let OptionParameters {
        spot,
        strike,
        time_to_expiry: time,
        rate,
        volatility: vol,
        dividend_yield: div,
        option_type,
    } = *params;

    if time <= 0.0 {
        return option_type.intrinsic(spot, strike);
    }

    let forward = params.forward();
    let df = params.discount_factor();

    if vol <= 0.0 {
        // Zero vol = forward intrinsic value discounted
        return df * option_type.intrinsic(forward, strike);
    }

    let d1 = d1(spot, strike, rate, div, vol, time);
    let d2 = d1 - vol * time.sqrt();

    let value = match option_type {
        OptionType::Call => df * (forward * norm_cdf(d1) - strike * norm_cdf(d2)),
        OptionType::Put => df * (strike * norm_cdf(-d2) - forward * norm_cdf(-d1)),
    };

    // Deep OTM prices can round a hair below zero
    value.max(0.0)
}

/// Black-Scholes Greeks
pub fn greeks(params: &OptionParameters) -> OptionsResult<Greeks> {
    params.validate()?;

    let OptionParameters {
        spot,
        strike,
        time_to_expiry: time,
        rate,
        volatility: vol,
        dividend_yield: div,
        option_type,
    } = *params;

    if time <= 0.0 || vol <= 0.0 {
        // At expiry or zero vol
        let delta = match option_type {
            OptionType::Call => {
                if spot > strike {
                    1.0
                } else {
                    0.0
                }
            }
            OptionType::Put => {
                if spot < strike {
                    -1.0
                } else {
                    0.0
                }
            }
        };
        return Ok(Greeks::new(delta, 0.0, 0.0, 0.0, 0.0));
    }

    let d1 = d1(spot, strike, rate, div, vol, time);
    let d2 = d1 - vol * time.sqrt();
    let df = params.discount_factor();
    let div_factor = params.dividend_factor();
    let sqrt_t = time.sqrt();
    let pdf_d1 = norm_pdf(d1);

    let delta = match option_type {
        OptionType::Call => div_factor * norm_cdf(d1),
        OptionType::Put => div_factor * (norm_cdf(d1) - 1.0),
    };

    // Gamma (same for call and put)
    let gamma = div_factor * pdf_d1 / (spot * vol * sqrt_t);

    // Vega (same for call and put, per 1% vol move)
    let vega = spot * div_factor * pdf_d1 * sqrt_t / 100.0;

    // Theta (per day)
    let term1 = -spot * div_factor * pdf_d1 * vol / (2.0 * sqrt_t);
    let theta = match option_type {
        OptionType::Call => {
            term1 - rate * strike * df * norm_cdf(d2) + div * spot * div_factor * norm_cdf(d1)
        }
        OptionType::Put => {
            term1 + rate * strike * df * norm_cdf(-d2) - div * spot * div_factor * norm_cdf(-d1)
        }
    };

    // Rho (per 1% rate move)
    let rho = match option_type {
        OptionType::Call => strike * time * df * norm_cdf(d2) / 100.0,
        OptionType::Put => -strike * time * df * norm_cdf(-d2) / 100.0,
    };

    Ok(Greeks::new(delta, gamma, theta / 365.0, vega, rho))
}
