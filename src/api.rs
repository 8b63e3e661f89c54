//! JSON request/response contract for pricing endpoints
//!
//! Transport-free: [`respond`] maps a request body to a status code and a
//! JSON body, so any HTTP layer (or the CLI) can sit in front of it.

use serde::{Deserialize, Serialize};

use crate::core::{Greeks, OptionParameters, OptionType, OptionsError, OptionsResult};
use crate::models::black_scholes;

/// Pricing inputs in the wire format
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingRequest {
    #[serde(rename = "S")]
    pub spot: f64,
    #[serde(rename = "K")]
    pub strike: f64,
    #[serde(rename = "T")]
    pub time_to_expiry: f64,
    #[serde(rename = "r")]
    pub rate: f64,
    #[serde(rename = "sigma")]
    pub volatility: f64,
    #[serde(default = "default_option_type")]
    pub option_type: OptionType,
    #[serde(rename = "q", default)]
    pub dividend_yield: f64,
}

fn default_option_type() -> OptionType {
    OptionType::Call
}

impl PricingRequest {
    pub fn to_parameters(&self) -> OptionParameters {
        OptionParameters::new(
            self.spot,
            self.strike,
            self.time_to_expiry,
            self.rate,
            self.volatility,
            self.option_type,
        )
        .with_dividend_yield(self.dividend_yield)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceResponse {
    pub price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GreeksResponse {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

impl From<Greeks> for GreeksResponse {
    fn from(g: Greeks) -> Self {
        Self {
            delta: g.delta,
            gamma: g.gamma,
            theta: g.theta,
            vega: g.vega,
            rho: g.rho,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable kind, e.g. `invalid_parameter`
    pub error: String,
    pub message: String,
}

impl From<&OptionsError> for ErrorResponse {
    fn from(e: &OptionsError) -> Self {
        Self {
            error: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

/// Pricing operation a JSON body is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Price,
    Greeks,
}

pub fn price(request: &PricingRequest) -> OptionsResult<PriceResponse> {
    let price = black_scholes::price(&request.to_parameters())?;
    Ok(PriceResponse { price })
}

pub fn greeks(request: &PricingRequest) -> OptionsResult<GreeksResponse> {
    let greeks = black_scholes::greeks(&request.to_parameters())?;
    Ok(greeks.into())
}

/// Handle a raw JSON body: 200 with the result, 400 with an [`ErrorResponse`]
pub fn respond(endpoint: Endpoint, body: &str) -> (u16, String) {
    match handle(endpoint, body) {
        Ok(json) => (200, json),
        Err(e) => {
            let status = match e {
                OptionsError::InvalidParameter(_) | OptionsError::Json(_) => 400,
                _ => 500,
            };
            let payload = serde_json::to_string(&ErrorResponse::from(&e)).unwrap_or_else(|_| {
                format!(r#"{{"error":"{}","message":"unserializable error"}}"#, e.kind())
            });
            (status, payload)
        }
    }
}

fn handle(endpoint: Endpoint, body: &str) -> OptionsResult<String> {
    let request: PricingRequest = serde_json::from_str(body)?;
    let json = match endpoint {
        Endpoint::Price => serde_json::to_string(&price(&request)?)?,
        Endpoint::Greeks => serde_json::to_string(&greeks(&request)?)?,
    };
    Ok(json)
}
