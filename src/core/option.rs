//! Option type and pricing parameters
//!
//! `OptionParameters` is the single input to the pricer and the IV solver.
//! Inputs are validated here so that nothing downstream has to re-check them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{OptionsError, OptionsResult};

/// Option type (Call or Put)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    /// Intrinsic value at given spot
    pub fn intrinsic(&self, spot: f64, strike: f64) -> f64 {
        match self {
            OptionType::Call => (spot - strike).max(0.0),
            OptionType::Put => (strike - spot).max(0.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionType {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "call" | "c" => Ok(OptionType::Call),
            "put" | "p" => Ok(OptionType::Put),
            other => Err(OptionsError::invalid_parameter(format!(
                "unknown option type '{}'",
                other
            ))),
        }
    }
}

/// Inputs to a single Black-Scholes evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionParameters {
    /// Underlying price S
    pub spot: f64,
    /// Strike price K
    pub strike: f64,
    /// Time to expiry T in years
    pub time_to_expiry: f64,
    /// Continuously compounded risk-free rate r
    pub rate: f64,
    /// Annualized volatility σ
    pub volatility: f64,
    /// Continuous dividend yield q
    pub dividend_yield: f64,
    pub option_type: OptionType,
}

impl OptionParameters {
    pub fn new(
        spot: f64,
        strike: f64,
        time_to_expiry: f64,
        rate: f64,
        volatility: f64,
        option_type: OptionType,
    ) -> Self {
        Self {
            spot,
            strike,
            time_to_expiry,
            rate,
            volatility,
            dividend_yield: 0.0,
            option_type,
        }
    }

    pub fn with_dividend_yield(mut self, dividend_yield: f64) -> Self {
        self.dividend_yield = dividend_yield;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    /// Reject inputs the pricer cannot handle
    pub fn validate(&self) -> OptionsResult<()> {
        let fields = [
            ("spot", self.spot),
            ("strike", self.strike),
            ("time_to_expiry", self.time_to_expiry),
            ("rate", self.rate),
            ("volatility", self.volatility),
            ("dividend_yield", self.dividend_yield),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(OptionsError::invalid_parameter(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }

        if self.spot <= 0.0 {
            return Err(OptionsError::invalid_parameter(format!(
                "spot must be positive, got {}",
                self.spot
            )));
        }
        if self.strike <= 0.0 {
            return Err(OptionsError::invalid_parameter(format!(
                "strike must be positive, got {}",
                self.strike
            )));
        }
        if self.time_to_expiry < 0.0 {
            return Err(OptionsError::invalid_parameter(format!(
                "time to expiry must be non-negative, got {}",
                self.time_to_expiry
            )));
        }
        if self.volatility < 0.0 {
            return Err(OptionsError::invalid_parameter(format!(
                "volatility must be non-negative, got {}",
                self.volatility
            )));
        }
        if self.dividend_yield < 0.0 {
            return Err(OptionsError::invalid_parameter(format!(
                "dividend yield must be non-negative, got {}",
                self.dividend_yield
            )));
        }

        Ok(())
    }

    /// Forward price F = S * exp((r - q) * T)
    pub fn forward(&self) -> f64 {
        self.spot * ((self.rate - self.dividend_yield) * self.time_to_expiry).exp()
    }

    /// Discount factor exp(-r * T)
    pub fn discount_factor(&self) -> f64 {
        (-self.rate * self.time_to_expiry).exp()
    }

    /// Dividend discount exp(-q * T)
    pub fn dividend_factor(&self) -> f64 {
        (-self.dividend_yield * self.time_to_expiry).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atm_call() -> OptionParameters {
        OptionParameters::new(100.0, 100.0, 1.0, 0.05, 0.2, OptionType::Call)
    }

    #[test]
    fn test_option_type() {
        assert_eq!(OptionType::Call.intrinsic(110.0, 100.0), 10.0);
        assert_eq!(OptionType::Put.intrinsic(90.0, 100.0), 10.0);
        assert_eq!(OptionType::Call.intrinsic(90.0, 100.0), 0.0);

        assert_eq!("CALL".parse::<OptionType>().unwrap(), OptionType::Call);
        assert_eq!(" put ".parse::<OptionType>().unwrap(), OptionType::Put);
        assert!("straddle".parse::<OptionType>().is_err());
        assert_eq!(OptionType::Put.to_string(), "put");
    }

    #[test]
    fn test_validate_accepts_edges() {
        assert!(atm_call().validate().is_ok());
        assert!(atm_call().with_volatility(0.0).validate().is_ok());

        let mut expiring = atm_call();
        expiring.time_to_expiry = 0.0;
        assert!(expiring.validate().is_ok());

        // Negative rates are a real market condition
        let mut negative_rate = atm_call();
        negative_rate.rate = -0.005;
        assert!(negative_rate.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_inputs() {
        let cases = [
            OptionParameters { spot: 0.0, ..atm_call() },
            OptionParameters { strike: -1.0, ..atm_call() },
            OptionParameters { time_to_expiry: -0.1, ..atm_call() },
            OptionParameters { volatility: -0.2, ..atm_call() },
            OptionParameters { dividend_yield: -0.01, ..atm_call() },
            OptionParameters { spot: f64::NAN, ..atm_call() },
            OptionParameters { rate: f64::INFINITY, ..atm_call() },
        ];

        for params in cases {
            assert!(
                matches!(params.validate(), Err(OptionsError::InvalidParameter(_))),
                "expected rejection for {:?}",
                params
            );
        }
    }

    #[test]
    fn test_forward_and_discount() {
        let params = atm_call().with_dividend_yield(0.01);
        assert!((params.forward() - 100.0 * 0.04_f64.exp()).abs() < 1e-12);
        assert!((params.discount_factor() - (-0.05_f64).exp()).abs() < 1e-12);
        assert!((params.dividend_factor() - (-0.01_f64).exp()).abs() < 1e-12);
    }
}
