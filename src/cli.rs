//! Command-line interface
//!
//! Argument parsing and the command flow behind the `option-analyzer`
//! binary. [`execute`] takes the market data provider and the output sink as
//! parameters so the whole flow runs against fixtures.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{respond, Endpoint};
use crate::config::AnalyzerConfig;
use crate::core::{AnalysisRecord, OptionsError, OptionsResult};
use crate::data::{normalize_symbols, MarketDataFetcher, MarketDataProvider, YahooClient};
use crate::detector::VarianceDetector;
use crate::export::write_csv;
use crate::pipeline::{RunReport, VarianceAnalyzer};
use crate::sample::sample_records;
use crate::store::{ResultStore, StoreSummary};

pub const DEFAULT_SYMBOLS: [&str; 8] =
    ["AAPL", "TSLA", "SPY", "QQQ", "NVDA", "MSFT", "GOOGL", "AMZN"];

/// Exit code when every requested symbol failed to fetch
pub const EXIT_ALL_FAILED: i32 = 2;

/// Option Analyzer - market vs Black-Scholes variance scanner
#[derive(Parser, Debug)]
#[command(name = "option-analyzer")]
#[command(version)]
#[command(about = "Flag options whose market price deviates from Black-Scholes")]
#[command(long_about = None)]
pub struct Cli {
    /// Symbols to analyze (comma or space separated)
    #[arg(short, long, value_delimiter = ',', num_args = 1..)]
    pub symbols: Vec<String>,

    /// Minimum |variance%| to flag [default: 25]
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Annual risk-free rate as a decimal [default: 0.05]
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// Use the provider's T-bill proxy, falling back to --risk-free-rate
    #[arg(long)]
    pub live_rate: bool,

    /// Write flagged contracts to this CSV file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show stored results without fetching
    #[arg(long)]
    pub show_only: bool,

    /// Create the database schema, then continue
    #[arg(long)]
    pub init_db: bool,

    /// Delete every stored result and exit
    #[arg(long)]
    pub cleanup: bool,

    /// Insert demo records and exit
    #[arg(long)]
    pub create_sample: bool,

    /// Rows to display
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Nearest expiries to fetch per symbol [default: 3]
    #[arg(long)]
    pub max_expirations: Option<usize>,

    /// SQLite database path [default: $OPTION_VARIANCE_DB or option_variance.db]
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Price a contract from a JSON request and print the response
    #[arg(long, value_name = "JSON")]
    pub price_json: Option<String>,

    /// Compute Greeks from a JSON request and print the response
    #[arg(long, value_name = "JSON")]
    pub greeks_json: Option<String>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("Warning: tracing subscriber already set");
        }
    }

    /// File config (or defaults) with command-line overrides applied
    pub fn analyzer_config(&self) -> OptionsResult<AnalyzerConfig> {
        let mut config = match &self.config {
            Some(path) => AnalyzerConfig::load(path)?,
            None => AnalyzerConfig::default(),
        };

        if let Some(threshold) = self.threshold {
            config.override_threshold(threshold);
        }
        if let Some(rate) = self.risk_free_rate {
            config.fetcher.risk_free_rate = rate;
        }
        if self.live_rate {
            config.fetcher.live_rate = true;
        }
        if let Some(max) = self.max_expirations {
            config.fetcher.max_expirations = Some(max);
        }
        if let Some(db) = &self.db {
            config.storage.db_path = db.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Requested symbols, normalized, or the default watchlist
    pub fn symbols(&self) -> Vec<String> {
        let raw: Vec<String> = if self.symbols.is_empty() {
            DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
        } else {
            self.symbols
                .iter()
                .flat_map(|s| s.split_whitespace())
                .map(str::to_string)
                .collect()
        };
        normalize_symbols(&raw)
    }
}

/// Run the parsed command against Yahoo Finance, printing to stdout
pub fn run(cli: &Cli) -> OptionsResult<i32> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(cli, &mut out, |config: &AnalyzerConfig| {
        YahooClient::with_settings(config.fetcher.timeout(), config.fetcher.request_delay())
    })
}

/// Run the parsed command and return the process exit code.
///
/// `provider` is only called when a live analysis is requested. Fatal
/// storage and config errors come back as `Err`.
pub fn execute<W, P, F>(cli: &Cli, out: &mut W, provider: F) -> OptionsResult<i32>
where
    W: Write,
    P: MarketDataProvider,
    F: FnOnce(&AnalyzerConfig) -> OptionsResult<P>,
{
    if let Some(body) = &cli.price_json {
        return api_response(out, Endpoint::Price, body);
    }
    if let Some(body) = &cli.greeks_json {
        return api_response(out, Endpoint::Greeks, body);
    }

    let config = cli.analyzer_config()?;
    let mut store = ResultStore::open(&config.storage.db_path)?;

    if cli.init_db {
        store.init_schema()?;
        writeln!(out, "Database initialized at {}", config.storage.db_path.display())?;
    }

    if cli.cleanup {
        require_schema(&store)?;
        let removed = store.clear()?;
        writeln!(out, "Removed {} stored results", removed)?;
        return Ok(0);
    }

    if cli.create_sample {
        store.init_schema()?;
        let records = sample_records(chrono::Utc::now(), 42);
        let inserted = store.insert_batch(&records)?;
        writeln!(out, "Inserted {} sample records", inserted)?;
        write_summary(out, &store.summary()?)?;
        return Ok(0);
    }

    require_schema(&store)?;

    let threshold = config.detector.threshold_pct;
    if cli.show_only {
        let records = store.top_by_variance(cli.limit, Some(threshold))?;
        writeln!(out, "Stored contracts with |variance| >= {:.1}%\n", threshold)?;
        write_records(out, &records)?;
        if let Some(path) = &cli.output {
            write_csv(path, &records)?;
            writeln!(out, "\nSaved {} rows to {}", records.len(), path.display())?;
        }
        write_summary(out, &store.summary()?)?;
        return Ok(0);
    }

    let symbols = cli.symbols();
    info!("Analyzing {} symbols: {}", symbols.len(), symbols.join(", "));

    let fetcher = MarketDataFetcher::with_config(provider(&config)?, config.fetcher_config());
    let detector = VarianceDetector::with_config(config.detector.clone());
    let analyzer = VarianceAnalyzer::new(fetcher, detector);

    let report = analyzer.run(&symbols, &config.expiry_filter(), Some(&mut store))?;

    writeln!(
        out,
        "Options Variance Analysis ({} symbols, r = {:.2}%, threshold {:.1}%)",
        symbols.len(),
        report.risk_free_rate * 100.0,
        threshold
    )?;
    writeln!(out, "{}\n", "=".repeat(64))?;

    let shown = report.records.len().min(cli.limit);
    write_records(out, &report.records[..shown])?;
    writeln!(
        out,
        "\n{} flagged, {} under threshold, {} contracts priced, {} stored",
        report.records.len(),
        report.below_threshold,
        report.evaluated,
        report.stored
    )?;

    write_skipped(out, &report)?;

    if let Some(path) = &cli.output {
        write_csv(path, &report.records)?;
        writeln!(out, "\nSaved {} rows to {}", report.records.len(), path.display())?;
    }

    write_summary(out, &store.summary()?)?;

    if report.all_failed(symbols.len()) {
        eprintln!("Error: no symbol could be fetched");
        return Ok(EXIT_ALL_FAILED);
    }
    Ok(0)
}

fn require_schema(store: &ResultStore) -> OptionsResult<()> {
    if store.has_schema()? {
        Ok(())
    } else {
        Err(OptionsError::storage(
            "database is not initialized; run again with --init-db",
        ))
    }
}

fn api_response(out: &mut impl Write, endpoint: Endpoint, body: &str) -> OptionsResult<i32> {
    let (status, json) = respond(endpoint, body);
    writeln!(out, "{}", json)?;
    Ok(if status == 200 { 0 } else { 1 })
}

fn write_records(out: &mut impl Write, records: &[AnalysisRecord]) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(out, "No contracts above threshold.");
    }

    writeln!(
        out,
        "{:<8} {:<5} {:>9} {:>9} {:>9} {:>9} {:>7} {:>8} {:>8}  {:<10}",
        "Symbol", "Type", "Strike", "Market", "BS Price", "Var%", "IV", "Volume", "OI", "Expiry"
    )?;
    writeln!(out, "{}", "-".repeat(96))?;

    for r in records {
        let q = &r.quote;
        let iv = q
            .implied_volatility
            .map(|v| format!("{:.1}%", v * 100.0))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            out,
            "{:<8} {:<5} {:>9.2} {:>9.2} {:>9.2} {:>+8.1}% {:>7} {:>8} {:>8}  {:<10}",
            q.symbol,
            q.option_type.as_str(),
            q.strike,
            r.market_price,
            r.theoretical_price,
            r.variance_pct,
            iv,
            q.volume,
            q.open_interest,
            q.expiry.format("%Y-%m-%d")
        )?;
    }
    Ok(())
}

fn write_skipped(out: &mut impl Write, report: &RunReport) -> io::Result<()> {
    if !report.failures.is_empty() {
        writeln!(out, "\nSkipped symbols:")?;
        for failure in &report.failures {
            writeln!(out, "  {}: {}", failure.symbol, failure.reason)?;
        }
    }

    if !report.skipped.is_empty() {
        let mut by_reason: BTreeMap<&str, usize> = BTreeMap::new();
        for s in &report.skipped {
            *by_reason.entry(s.reason.label()).or_insert(0) += 1;
        }
        writeln!(out, "\nSkipped contracts: {}", report.skipped.len())?;
        for (reason, count) in by_reason {
            writeln!(out, "  {:<24} {}", reason, count)?;
        }
    }
    Ok(())
}

fn write_summary(out: &mut impl Write, summary: &StoreSummary) -> io::Result<()> {
    writeln!(out, "\nStored results:")?;
    writeln!(out, "  Total:        {}", summary.total)?;
    writeln!(out, "  Calls / Puts: {} / {}", summary.calls, summary.puts)?;
    writeln!(out, "  Over / Under: {} / {}", summary.overpriced, summary.underpriced)?;
    writeln!(out, "  Symbols:      {}", summary.unique_symbols)?;
    if summary.total > 0 {
        writeln!(out, "  Mean var:     {:+.1}%", summary.mean_variance_pct)?;
        writeln!(out, "  Mean |var|:   {:.1}%", summary.mean_abs_variance_pct)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ContractQuote, OptionType};
    use crate::data::{FailureKind, StaticProvider};
    use chrono::{Duration, Utc};
    use std::path::Path;
    use tempfile::tempdir;

    fn parse(db: &Path, args: &[&str]) -> Cli {
        let db = db.to_string_lossy().to_string();
        let mut argv = vec!["option-analyzer", "--db", db.as_str()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn quote(symbol: &str, id: &str, price: f64) -> ContractQuote {
        let expiry = Utc::now().date_naive() + Duration::days(30);
        let mut q = ContractQuote::new(symbol, id, OptionType::Call, 100.0, expiry);
        q.bid = Some(price - 0.05);
        q.ask = Some(price + 0.05);
        q.implied_volatility = Some(0.2);
        q.volume = 100;
        q.open_interest = 1000;
        q
    }

    // ATM 30-day call at 20% vol is worth about 2.5
    fn provider() -> StaticProvider {
        StaticProvider::new()
            .with_symbol(
                "AAA",
                100.0,
                vec![quote("AAA", "AAA-1", 9.0), quote("AAA", "AAA-2", 2.6)],
            )
            .with_symbol("BBB", 100.0, vec![quote("BBB", "BBB-1", 6.0)])
            .fail_always("ZZZ", FailureKind::Data)
    }

    fn execute_with(cli: &Cli, provider: StaticProvider) -> (OptionsResult<i32>, String) {
        let mut out = Vec::new();
        let code = execute(cli, &mut out, move |_: &AnalyzerConfig| Ok(provider));
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_uninitialized_db_is_fatal() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("results.db");

        let (code, _) = execute_with(&parse(&db, &["-s", "AAA"]), provider());
        assert!(matches!(code, Err(OptionsError::Storage(_))));

        let (code, _) = execute_with(&parse(&db, &["--cleanup"]), provider());
        assert!(matches!(code, Err(OptionsError::Storage(_))));
    }

    #[test]
    fn test_init_db_runs_then_cleanup_empties() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("results.db");

        let cli = parse(&db, &["--init-db", "-s", "AAA,BBB"]);
        let (code, text) = execute_with(&cli, provider());
        assert_eq!(code.unwrap(), 0);
        assert!(text.contains("Database initialized"));
        assert!(text.contains("2 flagged, 1 under threshold, 3 contracts priced, 3 stored"));
        assert_eq!(ResultStore::open(&db).unwrap().count().unwrap(), 3);

        let (code, text) = execute_with(&parse(&db, &["--cleanup"]), provider());
        assert_eq!(code.unwrap(), 0);
        assert!(text.contains("Removed 3 stored results"));
        assert_eq!(ResultStore::open(&db).unwrap().count().unwrap(), 0);
    }

    #[test]
    fn test_show_only_applies_threshold_to_stored_rows() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("results.db");
        let cli = parse(&db, &["--init-db", "-s", "AAA BBB"]);
        assert_eq!(execute_with(&cli, provider()).0.unwrap(), 0);

        // One row per printed contract; the near-fair AAA-2 is stored but hidden
        let (code, text) = execute_with(&parse(&db, &["--show-only"]), StaticProvider::new());
        assert_eq!(code.unwrap(), 0);
        assert!(text.contains("|variance| >= 25.0%"));
        assert_eq!(text.matches("call").count(), 2);

        let relaxed = parse(&db, &["--show-only", "--threshold", "1"]);
        let (code, text) = execute_with(&relaxed, StaticProvider::new());
        assert_eq!(code.unwrap(), 0);
        assert_eq!(text.matches("call").count(), 3);
    }

    #[test]
    fn test_all_symbols_failed_exit_code() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("results.db");

        let (code, text) = execute_with(&parse(&db, &["--init-db", "-s", "ZZZ"]), provider());
        assert_eq!(code.unwrap(), EXIT_ALL_FAILED);
        assert!(text.contains("Skipped symbols:"));

        let (code, _) = execute_with(&parse(&db, &["-s", "aaa,ZZZ"]), provider());
        assert_eq!(code.unwrap(), 0);
    }

    #[test]
    fn test_threshold_flag_above_cap_is_accepted() {
        let dir = tempdir().unwrap();
        let cli = parse(&dir.path().join("results.db"), &["--threshold", "1500"]);
        let config = cli.analyzer_config().unwrap();
        assert_eq!(config.detector.threshold_pct, 1500.0);
        assert_eq!(config.detector.max_abs_variance_pct, None);
    }

    #[test]
    fn test_price_json_bypasses_store() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("never-created.db");

        let body = r#"{"S": 100, "K": 100, "T": 1, "r": 0.05, "sigma": 0.2}"#;
        let (code, text) = execute_with(&parse(&db, &["--price-json", body]), provider());
        assert_eq!(code.unwrap(), 0);
        assert!(text.contains("\"price\""));
        assert!(!db.exists());

        let bad = r#"{"S": -1, "K": 100, "T": 1, "r": 0.05, "sigma": 0.2}"#;
        let (code, text) = execute_with(&parse(&db, &["--greeks-json", bad]), provider());
        assert_eq!(code.unwrap(), 1);
        assert!(text.contains("invalid_parameter"));
    }

    #[test]
    fn test_symbols_default_and_normalized() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("results.db");
        assert_eq!(parse(&db, &[]).symbols().len(), DEFAULT_SYMBOLS.len());
        assert_eq!(
            parse(&db, &["-s", "spy aapl,SPY"]).symbols(),
            vec!["SPY".to_string(), "AAPL".to_string()]
        );
    }
}
