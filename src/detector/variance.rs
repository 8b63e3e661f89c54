//! VarianceDetector - facade for the screen/price/compare/rank pipeline

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{
    rank_records, variance_pct, Detection, DetectorConfig, Evaluation, SkipReason,
    SkippedContract,
};
use crate::core::{AnalysisRecord, ContractQuote, OptionParameters};
use crate::models::{black_scholes, IvSolver};

/// Shortest time to expiry used for pricing (same-day expiries)
pub const MIN_TIME_TO_EXPIRY: f64 = 0.001;

pub struct VarianceDetector {
    config: DetectorConfig,
    solver: IvSolver,
}

impl VarianceDetector {
    /// Create a new detector with default configuration
    pub fn new() -> Self {
        Self::with_config(DetectorConfig::default())
    }

    /// Create with custom configuration
    pub fn with_config(config: DetectorConfig) -> Self {
        Self {
            config,
            solver: IvSolver::new(),
        }
    }

    pub fn with_solver(mut self, solver: IvSolver) -> Self {
        self.solver = solver;
        self
    }

    /// Get current configuration
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Price every quote against `spot` and `rate`, without thresholding.
    ///
    /// All records share `as_of` as their timestamp.
    pub fn evaluate(
        &self,
        quotes: &[ContractQuote],
        spot: f64,
        rate: f64,
        as_of: DateTime<Utc>,
    ) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for quote in quotes {
            match self.analyze(quote, spot, rate, as_of) {
                Ok(record) => evaluation.records.push(record),
                Err(reason) => {
                    debug!("Skipping {}: {}", quote.contract_id, reason);
                    evaluation.skipped.push(SkippedContract {
                        symbol: quote.symbol.clone(),
                        contract_id: quote.contract_id.clone(),
                        reason,
                    });
                }
            }
        }

        evaluation
    }

    /// Evaluate, keep |variance%| >= threshold, and rank
    pub fn detect(
        &self,
        quotes: &[ContractQuote],
        spot: f64,
        rate: f64,
        as_of: DateTime<Utc>,
    ) -> Detection {
        let Evaluation {
            records: mut priced,
            skipped,
        } = self.evaluate(quotes, spot, rate, as_of);
        rank_records(&mut priced);

        let flagged: Vec<AnalysisRecord> = priced
            .iter()
            .filter(|r| r.abs_variance() >= self.config.threshold_pct)
            .cloned()
            .collect();

        Detection {
            evaluated: priced.len(),
            below_threshold: priced.len() - flagged.len(),
            records: flagged,
            priced,
            skipped,
        }
    }

    /// Turn one quote into a record, or say why not
    pub fn analyze(
        &self,
        quote: &ContractQuote,
        spot: f64,
        rate: f64,
        as_of: DateTime<Utc>,
    ) -> Result<AnalysisRecord, SkipReason> {
        let cfg = &self.config;

        let days = quote.days_to_expiry(as_of.date_naive());
        if days < 0 {
            return Err(SkipReason::Expired);
        }
        if days > cfg.max_days_to_expiry {
            return Err(SkipReason::TooFarOut { days });
        }

        let market_price = quote.market_price().ok_or(SkipReason::NoMarketPrice)?;
        if quote.volume < cfg.min_volume {
            return Err(SkipReason::LowVolume {
                volume: quote.volume,
            });
        }

        let vol = quote
            .implied_volatility
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or(SkipReason::MissingVolatility)?;

        let time_to_expiry = quote
            .time_to_expiry(as_of.date_naive())
            .max(MIN_TIME_TO_EXPIRY);
        let params = OptionParameters::new(
            spot,
            quote.strike,
            time_to_expiry,
            rate,
            vol,
            quote.option_type,
        )
        .with_dividend_yield(cfg.dividend_yield);

        let theoretical_price =
            black_scholes::price(&params).map_err(|e| SkipReason::Pricing(e.to_string()))?;
        if theoretical_price < cfg.min_theoretical_price {
            return Err(SkipReason::DegenerateTheoretical {
                theoretical: theoretical_price,
            });
        }

        let variance = variance_pct(market_price, theoretical_price).ok_or(
            SkipReason::DegenerateTheoretical {
                theoretical: theoretical_price,
            },
        )?;
        if let Some(cap) = cfg.max_abs_variance_pct {
            if variance.abs() >= cap {
                return Err(SkipReason::ExtremeVariance {
                    variance_pct: variance,
                });
            }
        }

        let solved_iv = if cfg.solve_implied_vol {
            match self.solver.solve(&params, market_price) {
                Ok(iv) => Some(iv),
                Err(e) => {
                    debug!("No implied vol for {}: {}", quote.contract_id, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(AnalysisRecord {
            quote: quote.clone(),
            underlying_price: spot,
            risk_free_rate: rate,
            time_to_expiry,
            market_price,
            theoretical_price,
            variance_pct: variance,
            solved_iv,
            timestamp: as_of,
        })
    }
}

impl Default for VarianceDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OptionType, PricingDirection};
    use chrono::{Duration, NaiveDate, TimeZone};

    const SPOT: f64 = 100.0;
    const RATE: f64 = 0.05;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 15, 30, 0).unwrap()
    }

    fn expiry(days: i64) -> NaiveDate {
        as_of().date_naive() + Duration::days(days)
    }

    fn quote(id: &str, option_type: OptionType, strike: f64, days: i64, iv: f64) -> ContractQuote {
        let mut q = ContractQuote::new("TEST", id, option_type, strike, expiry(days));
        q.implied_volatility = Some(iv);
        q.volume = 100;
        q.open_interest = 1000;
        q
    }

    /// A quote whose market price sits `ratio` times its theoretical price
    fn quote_at_ratio(id: &str, ratio: f64) -> ContractQuote {
        let mut q = quote(id, OptionType::Call, 100.0, 60, 0.25);
        let theo = theoretical(&q);
        q.last_price = Some(theo * ratio);
        q
    }

    fn theoretical(q: &ContractQuote) -> f64 {
        let t = q.time_to_expiry(as_of().date_naive());
        let vol = q.implied_volatility.unwrap();
        let params = OptionParameters::new(SPOT, q.strike, t, RATE, vol, q.option_type);
        black_scholes::price(&params).unwrap()
    }

    #[test]
    fn test_threshold_filter() {
        let detector = VarianceDetector::new();
        // 8.50 vs 6.20 and 6.50 vs 6.20, scaled onto a real theoretical price
        let quotes = vec![
            quote_at_ratio("HIGH", 8.50 / 6.20),
            quote_at_ratio("LOW", 6.50 / 6.20),
        ];

        let detection = detector.detect(&quotes, SPOT, RATE, as_of());

        assert_eq!(detection.evaluated, 2);
        assert_eq!(detection.below_threshold, 1);
        assert_eq!(detection.records.len(), 1);

        // Sub-threshold rows stay available for storage
        let priced: Vec<_> = detection
            .priced
            .iter()
            .map(|r| r.quote.contract_id.as_str())
            .collect();
        assert_eq!(priced, vec!["HIGH", "LOW"]);

        let record = &detection.records[0];
        assert_eq!(record.quote.contract_id, "HIGH");
        assert!((record.variance_pct - 37.1).abs() < 0.05);
        assert_eq!(record.direction(), Some(PricingDirection::Overpriced));
        assert_eq!(record.timestamp, as_of());
        assert_eq!(record.underlying_price, SPOT);
        assert_eq!(record.risk_free_rate, RATE);
    }

    #[test]
    fn test_underpriced_is_flagged() {
        let detector = VarianceDetector::new();
        let quotes = vec![quote_at_ratio("CHEAP", 0.6)];
        let detection = detector.detect(&quotes, SPOT, RATE, as_of());

        assert_eq!(detection.records.len(), 1);
        let record = &detection.records[0];
        assert!((record.variance_pct + 40.0).abs() < 1e-6);
        assert_eq!(record.direction(), Some(PricingDirection::Underpriced));
    }

    #[test]
    fn test_ranking_with_open_interest_tie_break() {
        let detector = VarianceDetector::new();
        let mut a = quote_at_ratio("A", 1.5);
        let mut b = quote_at_ratio("B", 1.5);
        let c = quote_at_ratio("C", 0.4);
        let d = quote_at_ratio("D", 1.3);
        a.open_interest = 10;
        b.open_interest = 5000;

        let detection = detector.detect(&[a, b, c, d], SPOT, RATE, as_of());
        let order: Vec<_> = detection
            .records
            .iter()
            .map(|r| r.quote.contract_id.as_str())
            .collect();

        // |-60| > |50| = |50| > |30|; equal variance goes to higher OI
        assert_eq!(order, vec!["C", "B", "A", "D"]);
    }

    #[test]
    fn test_skips_are_recorded() {
        let detector = VarianceDetector::new();

        let expired = quote_at_ratio("EXPIRED", 2.0);
        let expired = ContractQuote {
            expiry: expiry(-1),
            ..expired
        };

        let mut unpriced = quote("UNPRICED", OptionType::Put, 100.0, 30, 0.2);
        unpriced.last_price = None;

        let mut untraded = quote_at_ratio("UNTRADED", 2.0);
        untraded.volume = 0;

        let mut no_iv = quote_at_ratio("NO_IV", 2.0);
        no_iv.implied_volatility = Some(0.0);

        let far = ContractQuote {
            expiry: expiry(900),
            ..quote_at_ratio("FAR", 2.0)
        };

        // Deep OTM put: model value rounds to nothing
        let mut worthless = quote("WORTHLESS", OptionType::Put, 20.0, 10, 0.2);
        worthless.last_price = Some(0.05);

        let quotes = vec![expired, unpriced, untraded, no_iv, far, worthless];
        let detection = detector.detect(&quotes, SPOT, RATE, as_of());

        assert!(detection.records.is_empty());
        assert_eq!(detection.evaluated, 0);

        let reasons: Vec<_> = detection.skipped.iter().map(|s| s.reason.clone()).collect();
        assert_eq!(reasons[0], SkipReason::Expired);
        assert_eq!(reasons[1], SkipReason::NoMarketPrice);
        assert_eq!(reasons[2], SkipReason::LowVolume { volume: 0 });
        assert_eq!(reasons[3], SkipReason::MissingVolatility);
        assert!(matches!(reasons[4], SkipReason::TooFarOut { .. }));
        assert!(matches!(reasons[5], SkipReason::DegenerateTheoretical { .. }));
    }

    #[test]
    fn test_extreme_variance_excluded() {
        let detector = VarianceDetector::new();
        let detection = detector.detect(&[quote_at_ratio("WILD", 12.0)], SPOT, RATE, as_of());
        assert!(detection.records.is_empty());
        assert!(matches!(
            detection.skipped[0].reason,
            SkipReason::ExtremeVariance { .. }
        ));

        let uncapped = VarianceDetector::with_config(DetectorConfig {
            max_abs_variance_pct: None,
            ..Default::default()
        });
        let detection = uncapped.detect(&[quote_at_ratio("WILD", 12.0)], SPOT, RATE, as_of());
        assert_eq!(detection.records.len(), 1);
    }

    #[test]
    fn test_solved_iv_recovers_market_vol() {
        let detector = VarianceDetector::new();
        let q = quote_at_ratio("IV", 1.5);
        let record = detector.analyze(&q, SPOT, RATE, as_of()).unwrap();

        // Market above model means the market implies more vol than quoted
        let solved = record.solved_iv.unwrap();
        assert!(solved > 0.25);

        let t = record.time_to_expiry;
        let params = OptionParameters::new(SPOT, 100.0, t, RATE, solved, OptionType::Call);
        let repriced = black_scholes::price(&params).unwrap();
        assert!((repriced - record.market_price).abs() < 1e-6);
    }

    #[test]
    fn test_same_day_expiry_is_priced() {
        let detector = VarianceDetector::with_config(DetectorConfig::with_threshold(0.0));
        let mut q = quote("TODAY", OptionType::Call, 95.0, 0, 0.3);
        q.last_price = Some(5.10);
        let record = detector.analyze(&q, SPOT, RATE, as_of()).unwrap();
        assert_eq!(record.time_to_expiry, MIN_TIME_TO_EXPIRY);
        assert!(record.theoretical_price >= 5.0);
    }
}
