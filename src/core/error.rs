//! Error types for option analytics

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("IV solver did not converge: {0}")]
    Convergence(String),

    #[error("Price outside no-arbitrage bounds: {0}")]
    NoArbitrageBound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type OptionsResult<T> = Result<T, OptionsError>;

impl OptionsError {
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn convergence(msg: impl Into<String>) -> Self {
        Self::Convergence(msg.into())
    }

    pub fn no_arbitrage_bound(msg: impl Into<String>) -> Self {
        Self::NoArbitrageBound(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn data_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Whether a retry has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Network(_))
    }

    /// Stable snake_case label for structured error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::Convergence(_) => "convergence_error",
            Self::NoArbitrageBound(_) => "no_arbitrage_bound",
            Self::RateLimited(_) => "rate_limited",
            Self::Network(_) => "network_error",
            Self::Data(_) => "data_error",
            Self::DataUnavailable { .. } => "data_unavailable",
            Self::Storage(_) => "storage_error",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "bad_request",
            Self::Csv(_) => "csv_error",
        }
    }
}

impl From<rusqlite::Error> for OptionsError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
