//! Integration tests for the fetch -> detect -> store pipeline.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use option_variance::data::{FailureKind, StaticProvider};
use option_variance::export::write_csv;
use option_variance::prelude::*;
use option_variance::sample::sample_records;
use tempfile::tempdir;

fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 15, 30, 0).unwrap()
}

fn expiry(days: i64) -> NaiveDate {
    as_of().date_naive() + Duration::days(days)
}

/// A quote whose market mid sits `skew` (as a fraction) away from its own
/// Black-Scholes value.
fn skewed_quote(
    symbol: &str,
    spot: f64,
    strike: f64,
    days: i64,
    option_type: OptionType,
    skew: f64,
    open_interest: u64,
) -> ContractQuote {
    let expiry = expiry(days);
    let iv = 0.3;
    let t = days as f64 / 365.25;
    let theo = bs_price(&OptionParameters::new(spot, strike, t, 0.05, iv, option_type)).unwrap();
    let market = theo * (1.0 + skew);

    let id = ContractQuote::occ_symbol(symbol, expiry, option_type, strike);
    let mut q = ContractQuote::new(symbol, id, option_type, strike, expiry);
    q.bid = Some(market - 0.01);
    q.ask = Some(market + 0.01);
    q.implied_volatility = Some(iv);
    q.volume = 50;
    q.open_interest = open_interest;
    q
}

fn provider() -> StaticProvider {
    StaticProvider::new()
        .with_rate(0.05)
        .with_symbol(
            "SPY",
            450.0,
            vec![
                skewed_quote("SPY", 450.0, 450.0, 30, OptionType::Call, 0.40, 900),
                skewed_quote("SPY", 450.0, 440.0, 30, OptionType::Put, -0.30, 400),
                skewed_quote("SPY", 450.0, 460.0, 60, OptionType::Call, 0.05, 100),
                // Beyond the default expiry count
                skewed_quote("SPY", 450.0, 450.0, 120, OptionType::Call, 0.90, 100),
            ],
        )
        .with_symbol(
            "AAPL",
            175.0,
            vec![
                skewed_quote("AAPL", 175.0, 175.0, 30, OptionType::Call, 0.60, 50),
                skewed_quote("AAPL", 175.0, 180.0, 45, OptionType::Put, -0.10, 50),
            ],
        )
        .with_symbol("TSLA", 185.0, vec![])
        .fail_always("TSLA", FailureKind::Network)
}

fn analyzer(provider: &StaticProvider) -> VarianceAnalyzer<&StaticProvider> {
    let fetcher = MarketDataFetcher::with_config(
        provider,
        FetcherConfig {
            retry: RetryPolicy::immediate(2),
            risk_free_rate: 0.05,
            live_rate: true,
        },
    );
    VarianceAnalyzer::new(fetcher, VarianceDetector::new())
}

fn symbols() -> Vec<String> {
    vec!["spy".into(), "AAPL".into(), "TSLA".into()]
}

#[test]
fn test_full_run_ranks_and_stores() {
    let provider = provider();
    let mut store = ResultStore::open_in_memory().unwrap();
    store.init_schema().unwrap();

    let filter = ExpiryFilter {
        max_expirations: Some(2),
        ..ExpiryFilter::all()
    };
    let report = analyzer(&provider)
        .run_at(&symbols(), &filter, Some(&mut store), as_of())
        .unwrap();

    // 60% > 40% > |-30%|; the 5% and -10% contracts are under threshold
    let variances: Vec<f64> = report.records.iter().map(|r| r.variance_pct).collect();
    assert_eq!(variances.len(), 3);
    assert!((variances[0] - 60.0).abs() < 0.1);
    assert!((variances[1] - 40.0).abs() < 0.1);
    assert!((variances[2] + 30.0).abs() < 0.1);
    assert_eq!(report.records[0].quote.symbol, "AAPL");
    assert_eq!(report.records[2].direction(), Some(PricingDirection::Underpriced));

    // The 120-day SPY contract is outside the two nearest expiries
    assert_eq!(report.evaluated, 5);
    assert_eq!(report.below_threshold, 2);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].symbol, "TSLA");
    assert!((report.risk_free_rate - 0.05).abs() < 1e-12);

    // Every priced contract is stored; the threshold applies when reading back
    assert_eq!(report.stored, 5);
    let top = store.top_by_variance(10, None).unwrap();
    assert_eq!(top.len(), 5);
    assert_eq!(top[0].quote.contract_id, report.records[0].quote.contract_id);
    assert!(top.iter().all(|r| r.timestamp == as_of()));

    let flagged = store.top_by_variance(10, Some(25.0)).unwrap();
    assert_eq!(flagged.len(), 3);
    let relaxed = store.top_by_variance(10, Some(8.0)).unwrap();
    assert_eq!(relaxed.len(), 4);
}

#[test]
fn test_repeated_runs_append() {
    let provider = provider();
    let mut store = ResultStore::open_in_memory().unwrap();
    store.init_schema().unwrap();

    let analyzer = analyzer(&provider);
    let filter = ExpiryFilter::all();
    let first = analyzer
        .run_at(&symbols(), &filter, Some(&mut store), as_of())
        .unwrap();
    let second = analyzer
        .run_at(
            &symbols(),
            &filter,
            Some(&mut store),
            as_of() + Duration::hours(1),
        )
        .unwrap();

    assert_eq!(first.stored, second.stored);
    assert_eq!(store.count().unwrap(), first.stored * 2);

    let latest = store
        .query(&RecordQuery {
            from: Some(as_of() + Duration::minutes(30)),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(latest.len(), second.stored);

    let summary = store.summary().unwrap();
    assert_eq!(summary.unique_symbols, 2);
}

#[test]
fn test_run_exports_csv() {
    let provider = provider();
    let report = analyzer(&provider)
        .run_at(&symbols(), &ExpiryFilter::default(), None, as_of())
        .unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("flagged.csv");
    write_csv(&path, &report.records).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), report.records.len() + 1);
    let header = "symbol,type,strike,current,bs_price,variance_pct,iv,volume,oi,expiry";
    assert!(text.starts_with(header));
}

#[test]
fn test_sample_data_in_file_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.db");

    let mut store = ResultStore::open(&path).unwrap();
    store.init_schema().unwrap();
    assert_eq!(store.insert_batch(&sample_records(as_of(), 42)).unwrap(), 54);

    let summary = store.summary().unwrap();
    assert_eq!(summary.total, 54);
    assert_eq!(summary.calls, 27);
    assert_eq!(summary.puts, 27);
    assert_eq!(summary.overpriced, 54);
    assert_eq!(summary.unique_symbols, 3);

    // AAPL 175 put (5.80 vs 4.20) is the largest deviation in the book,
    // listed once per expiry
    let top = store.top_by_variance(3, Some(25.0)).unwrap();
    assert_eq!(top.len(), 3);
    for r in &top {
        assert_eq!(r.quote.symbol, "AAPL");
        assert_eq!(r.quote.strike, 175.0);
        assert_eq!(r.quote.option_type, OptionType::Put);
        assert!((r.variance_pct - 38.095238).abs() < 1e-4);
    }

    let spy = store.query(&RecordQuery::for_symbol("SPY")).unwrap();
    assert_eq!(spy.len(), 18);
}
