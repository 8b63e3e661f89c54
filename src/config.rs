//! Analyzer configuration file support
//!
//! A TOML file with `[detector]`, `[fetcher]` and `[storage]` sections.
//! Every field has a default, so an empty file is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{OptionsError, OptionsResult};
use crate::data::{ExpiryFilter, FetcherConfig, RetryPolicy};
use crate::detector::DetectorConfig;

/// Environment variable overriding the default database path
pub const DB_PATH_ENV: &str = "OPTION_VARIANCE_DB";
pub const DEFAULT_DB_FILE: &str = "option_variance.db";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub fetcher: FetcherSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Fetch and retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherSettings {
    /// Nearest expiries fetched per symbol; None fetches all
    pub max_expirations: Option<usize>,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Pause between chain requests to the same provider
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub risk_free_rate: f64,
    pub live_rate: bool,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            max_expirations: Some(3),
            max_attempts: 3,
            initial_backoff_ms: 2000,
            max_backoff_ms: 30_000,
            request_delay_ms: 1000,
            timeout_secs: 15,
            risk_free_rate: 0.05,
            live_rate: false,
        }
    }
}

impl FetcherSettings {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// `$OPTION_VARIANCE_DB`, or `option_variance.db` in the working directory
pub fn default_db_path() -> PathBuf {
    std::env::var_os(DB_PATH_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
}

impl AnalyzerConfig {
    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> OptionsResult<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            OptionsError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> OptionsResult<Self> {
        let config: AnalyzerConfig =
            toml::from_str(content).map_err(|e| OptionsError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> OptionsResult<String> {
        toml::to_string_pretty(self).map_err(|e| OptionsError::config(e.to_string()))
    }

    pub fn validate(&self) -> OptionsResult<()> {
        let d = &self.detector;
        if !d.threshold_pct.is_finite() || d.threshold_pct < 0.0 {
            return Err(OptionsError::config(format!(
                "threshold_pct must be a non-negative number, got {}",
                d.threshold_pct
            )));
        }
        if !d.dividend_yield.is_finite() || d.dividend_yield < 0.0 {
            return Err(OptionsError::config(format!(
                "dividend_yield must be non-negative, got {}",
                d.dividend_yield
            )));
        }
        if let Some(max) = d.max_abs_variance_pct {
            if !(max > d.threshold_pct) {
                return Err(OptionsError::config(format!(
                    "max_abs_variance_pct ({}) must exceed threshold_pct ({}); \
                     raise [detector] max_abs_variance_pct in the config file",
                    max, d.threshold_pct
                )));
            }
        }

        let f = &self.fetcher;
        if !f.risk_free_rate.is_finite() {
            return Err(OptionsError::config(format!(
                "risk_free_rate must be finite, got {}",
                f.risk_free_rate
            )));
        }
        if f.max_attempts == 0 {
            return Err(OptionsError::config("max_attempts must be at least 1"));
        }
        if f.max_expirations == Some(0) {
            return Err(OptionsError::config("max_expirations must be at least 1"));
        }

        Ok(())
    }

    /// Threshold given on the command line. A threshold at or above the
    /// extreme-variance cap lifts the cap, otherwise nothing could be flagged.
    pub fn override_threshold(&mut self, threshold_pct: f64) {
        let d = &mut self.detector;
        d.threshold_pct = threshold_pct;
        if let Some(max) = d.max_abs_variance_pct {
            if threshold_pct >= max {
                info!(
                    "Threshold {}% is at or above the {}% data-error cap; cap disabled",
                    threshold_pct, max
                );
                d.max_abs_variance_pct = None;
            }
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        let f = &self.fetcher;
        FetcherConfig {
            retry: RetryPolicy {
                max_attempts: f.max_attempts,
                initial_backoff: Duration::from_millis(f.initial_backoff_ms),
                multiplier: 2.0,
                max_backoff: Duration::from_millis(f.max_backoff_ms),
            },
            risk_free_rate: f.risk_free_rate,
            live_rate: f.live_rate,
        }
    }

    pub fn expiry_filter(&self) -> ExpiryFilter {
        ExpiryFilter {
            max_expirations: self.fetcher.max_expirations,
            ..ExpiryFilter::all()
        }
    }
}
