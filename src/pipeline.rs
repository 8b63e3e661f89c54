//! End-to-end analysis run: fetch, detect, rank, persist

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{AnalysisRecord, OptionsResult};
use crate::data::{ExpiryFilter, FetchFailure, MarketDataFetcher, MarketDataProvider};
use crate::detector::{Detection, SkippedContract, VarianceDetector};
use crate::store::ResultStore;

/// Outcome of one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub risk_free_rate: f64,
    /// Flagged records across all symbols, ranked
    pub records: Vec<AnalysisRecord>,
    pub failures: Vec<FetchFailure>,
    pub skipped: Vec<SkippedContract>,
    pub evaluated: usize,
    pub below_threshold: usize,
    /// Rows written to the store: every priced record (0 without a store)
    pub stored: usize,
    /// Shared by every record of the run
    pub timestamp: DateTime<Utc>,
}

impl RunReport {
    /// Symbols that produced a snapshot
    pub fn succeeded(&self, requested: usize) -> usize {
        requested.saturating_sub(self.failures.len())
    }

    /// True when symbols were requested and none could be fetched
    pub fn all_failed(&self, requested: usize) -> bool {
        requested > 0 && self.failures.len() >= requested
    }
}

/// Ties a fetcher and a detector together
pub struct VarianceAnalyzer<P> {
    fetcher: MarketDataFetcher<P>,
    detector: VarianceDetector,
}

impl<P: MarketDataProvider> VarianceAnalyzer<P> {
    pub fn new(fetcher: MarketDataFetcher<P>, detector: VarianceDetector) -> Self {
        Self { fetcher, detector }
    }

    pub fn fetcher(&self) -> &MarketDataFetcher<P> {
        &self.fetcher
    }

    pub fn detector(&self) -> &VarianceDetector {
        &self.detector
    }

    /// Run for `symbols` as of now
    pub fn run(
        &self,
        symbols: &[String],
        filter: &ExpiryFilter,
        store: Option<&mut ResultStore>,
    ) -> OptionsResult<RunReport> {
        self.run_at(symbols, filter, store, Utc::now())
    }

    /// Run with an explicit timestamp.
    ///
    /// Per-symbol fetch failures are reported, not returned. A storage
    /// failure aborts the run.
    pub fn run_at(
        &self,
        symbols: &[String],
        filter: &ExpiryFilter,
        store: Option<&mut ResultStore>,
        as_of: DateTime<Utc>,
    ) -> OptionsResult<RunReport> {
        let fetched = self.fetcher.fetch(symbols, filter);

        let mut detection = Detection::default();
        for snapshot in &fetched.snapshots {
            let found = self.detector.detect(
                &snapshot.quotes,
                snapshot.spot,
                fetched.risk_free_rate,
                as_of,
            );
            info!(
                "{}: {} flagged of {} priced ({} skipped)",
                snapshot.symbol,
                found.records.len(),
                found.evaluated,
                found.skipped.len()
            );
            detection.merge(found);
        }

        // Everything priced is kept; the threshold is reapplied at query time
        let stored = match store {
            Some(store) if !detection.priced.is_empty() => {
                store.insert_batch(&detection.priced)?
            }
            _ => 0,
        };

        Ok(RunReport {
            risk_free_rate: fetched.risk_free_rate,
            records: detection.records,
            failures: fetched.failures,
            skipped: detection.skipped,
            evaluated: detection.evaluated,
            below_threshold: detection.below_threshold,
            stored,
            timestamp: as_of,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ContractQuote, OptionType, OptionsError};
    use crate::data::{FailureKind, FetcherConfig, RetryPolicy, StaticProvider};
    use crate::detector::DetectorConfig;
    use chrono::{NaiveDate, TimeZone};

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 15, 30, 0).unwrap()
    }

    fn quote(symbol: &str, id: &str, price: f64, iv: f64) -> ContractQuote {
        let expiry = NaiveDate::from_ymd_opt(2025, 4, 9).unwrap();
        let mut q = ContractQuote::new(symbol, id, OptionType::Call, 100.0, expiry);
        q.bid = Some(price - 0.05);
        q.ask = Some(price + 0.05);
        q.implied_volatility = Some(iv);
        q.volume = 100;
        q.open_interest = 1000;
        q
    }

    fn analyzer(provider: &StaticProvider) -> VarianceAnalyzer<&StaticProvider> {
        let fetcher = MarketDataFetcher::with_config(
            provider,
            FetcherConfig {
                retry: RetryPolicy::immediate(2),
                ..Default::default()
            },
        );
        VarianceAnalyzer::new(fetcher, VarianceDetector::with_config(DetectorConfig::default()))
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // ATM 30-day call at 20% vol is worth about 2.5; 9.0 is far above it,
    // 2.5 sits inside the threshold
    fn provider() -> StaticProvider {
        StaticProvider::new()
            .with_symbol(
                "AAA",
                100.0,
                vec![quote("AAA", "AAA-1", 9.0, 0.2), quote("AAA", "AAA-2", 2.5, 0.2)],
            )
            .with_symbol("BBB", 100.0, vec![quote("BBB", "BBB-1", 6.0, 0.2)])
            .with_symbol("CCC", 100.0, vec![quote("CCC", "CCC-1", 9.0, 0.2)])
            .fail_always("CCC", FailureKind::Data)
    }

    #[test]
    fn test_run_merges_and_ranks_across_symbols() {
        let provider = provider();
        let report = analyzer(&provider)
            .run_at(&symbols(&["AAA", "BBB", "CCC"]), &ExpiryFilter::all(), None, as_of())
            .unwrap();

        let ids: Vec<_> = report.records.iter().map(|r| r.quote.contract_id.as_str()).collect();
        assert_eq!(ids, vec!["AAA-1", "BBB-1"]);
        assert_eq!(report.evaluated, 3);
        assert_eq!(report.below_threshold, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].symbol, "CCC");
        assert_eq!(report.stored, 0);
        assert!(report.records.iter().all(|r| r.timestamp == as_of()));
        assert!(!report.all_failed(3));
        assert_eq!(report.succeeded(3), 2);
    }

    #[test]
    fn test_run_stores_every_priced_record() {
        let provider = provider();
        let mut store = ResultStore::open_in_memory().unwrap();
        store.init_schema().unwrap();

        let report = analyzer(&provider)
            .run_at(&symbols(&["AAA", "BBB"]), &ExpiryFilter::all(), Some(&mut store), as_of())
            .unwrap();

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.stored, 3);
        assert_eq!(store.count().unwrap(), 3);

        // A lower threshold at query time sees the row the run did not flag
        let flagged = store.top_by_variance(10, Some(25.0)).unwrap();
        assert_eq!(flagged.len(), 2);
        let everything = store.top_by_variance(10, Some(0.0)).unwrap();
        assert_eq!(everything.len(), 3);
        assert_eq!(everything[2].quote.contract_id, "AAA-2");

        let summary = store.summary().unwrap();
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn test_storage_failure_aborts_run() {
        let provider = provider();
        // No schema
        let mut store = ResultStore::open_in_memory().unwrap();

        let err = analyzer(&provider)
            .run_at(&symbols(&["AAA"]), &ExpiryFilter::all(), Some(&mut store), as_of())
            .unwrap_err();
        assert!(matches!(err, OptionsError::Storage(_)));
    }

    #[test]
    fn test_all_symbols_failed() {
        let provider = provider();
        let report = analyzer(&provider)
            .run_at(&symbols(&["CCC", "ZZZ"]), &ExpiryFilter::all(), None, as_of())
            .unwrap();
        assert!(report.records.is_empty());
        assert!(report.all_failed(2));
    }
}
