//! Append-only result store
//!
//! Persists analysis records to SQLite, one row per
//! (symbol, contract, timestamp). Re-running an analysis appends a new
//! timestamped set of rows; existing rows are never updated.

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row, ToSql};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{AnalysisRecord, ContractQuote, OptionType, OptionsError, OptionsResult};

const SELECT_COLUMNS: &str = "symbol, contract_id, timestamp, option_type, strike, expiry,
    bid, ask, last_price, implied_volatility, volume, open_interest,
    underlying_price, risk_free_rate, time_to_expiry, market_price,
    theoretical_price, variance_pct, solved_iv";

/// Filter for [`ResultStore::query`]
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// Exact underlying symbol
    pub symbol: Option<String>,
    /// Inclusive lower bound on the analysis timestamp
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the analysis timestamp
    pub to: Option<DateTime<Utc>>,
    /// Only rows with |variance%| at or above this
    pub min_abs_variance_pct: Option<f64>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Default::default()
        }
    }
}

/// One solved implied volatility from the stored history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvPoint {
    pub strike: f64,
    pub option_type: OptionType,
    /// Volatility that reproduces the market price
    pub solved_iv: f64,
    /// Provider-quoted volatility, when the chain carried one
    pub quoted_iv: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate view over every stored row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub total: usize,
    pub calls: usize,
    pub puts: usize,
    pub overpriced: usize,
    pub underpriced: usize,
    pub unique_symbols: usize,
    /// Mean signed variance%
    pub mean_variance_pct: f64,
    /// Mean |variance%|
    pub mean_abs_variance_pct: f64,
}

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    /// Open (or create) a database file. The schema is not created here;
    /// see [`ResultStore::init_schema`].
    pub fn open(path: impl AsRef<Path>) -> OptionsResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            OptionsError::storage(format!("Failed to open database {}: {}", path.display(), e))
        })?;
        debug!("Opened result store at {}", path.display());

        Ok(Self { conn })
    }

    pub fn open_in_memory() -> OptionsResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| OptionsError::storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { conn })
    }

    /// Create the table and indices if they do not exist
    pub fn init_schema(&self) -> OptionsResult<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS analysis_records (
                    symbol TEXT NOT NULL,
                    contract_id TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    option_type TEXT NOT NULL,
                    strike REAL NOT NULL,
                    expiry TEXT NOT NULL,
                    bid REAL,
                    ask REAL,
                    last_price REAL,
                    implied_volatility REAL,
                    volume INTEGER NOT NULL,
                    open_interest INTEGER NOT NULL,
                    underlying_price REAL NOT NULL,
                    risk_free_rate REAL NOT NULL,
                    time_to_expiry REAL NOT NULL,
                    market_price REAL NOT NULL,
                    theoretical_price REAL NOT NULL,
                    variance_pct REAL NOT NULL,
                    abs_variance_pct REAL NOT NULL,
                    solved_iv REAL,
                    PRIMARY KEY (symbol, contract_id, timestamp)
                )",
                [],
            )
            .map_err(|e| OptionsError::storage(format!("Failed to create table: {}", e)))?;

        let indices = [
            "CREATE INDEX IF NOT EXISTS idx_records_symbol ON analysis_records(symbol)",
            "CREATE INDEX IF NOT EXISTS idx_records_timestamp ON analysis_records(timestamp DESC)",
            "CREATE INDEX IF NOT EXISTS idx_records_variance
             ON analysis_records(abs_variance_pct DESC)",
        ];
        for sql in indices {
            self.conn.execute(sql, []).map_err(|e| {
                OptionsError::storage(format!("Failed to create index: {}", e))
            })?;
        }

        info!("Result store schema ready");
        Ok(())
    }

    /// Whether `init_schema` has been run on this database
    pub fn has_schema(&self) -> OptionsResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'analysis_records'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Append records in one transaction. A duplicate
    /// (symbol, contract, timestamp) fails the whole batch.
    pub fn insert_batch(&mut self, records: &[AnalysisRecord]) -> OptionsResult<usize> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| OptionsError::storage(format!("Failed to begin transaction: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO analysis_records (
                        symbol, contract_id, timestamp, option_type, strike, expiry,
                        bid, ask, last_price, implied_volatility, volume, open_interest,
                        underlying_price, risk_free_rate, time_to_expiry, market_price,
                        theoretical_price, variance_pct, abs_variance_pct, solved_iv
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                        ?16, ?17, ?18, ?19, ?20)",
                )
                .map_err(|e| OptionsError::storage(format!("Failed to prepare insert: {}", e)))?;

            for record in records {
                let q = &record.quote;
                stmt.execute(params![
                    q.symbol,
                    q.contract_id,
                    format_timestamp(&record.timestamp),
                    q.option_type.as_str(),
                    q.strike,
                    q.expiry.format("%Y-%m-%d").to_string(),
                    q.bid,
                    q.ask,
                    q.last_price,
                    q.implied_volatility,
                    clamp_count(q.volume),
                    clamp_count(q.open_interest),
                    record.underlying_price,
                    record.risk_free_rate,
                    record.time_to_expiry,
                    record.market_price,
                    record.theoretical_price,
                    record.variance_pct,
                    record.abs_variance(),
                    record.solved_iv,
                ])
                .map_err(|e| {
                    OptionsError::storage(format!(
                        "Failed to insert {} at {}: {}",
                        q.contract_id, record.timestamp, e
                    ))
                })?;
            }
        }

        tx.commit()
            .map_err(|e| OptionsError::storage(format!("Failed to commit batch: {}", e)))?;

        info!("Stored {} analysis records", records.len());
        Ok(records.len())
    }

    /// Rows matching `query`, newest first
    pub fn query(&self, query: &RecordQuery) -> OptionsResult<Vec<AnalysisRecord>> {
        let mut sql = format!("SELECT {} FROM analysis_records WHERE 1=1", SELECT_COLUMNS);
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(symbol) = &query.symbol {
            sql.push_str(" AND symbol = ?");
            args.push(Box::new(symbol.clone()));
        }
        if let Some(from) = &query.from {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(format_timestamp(from)));
        }
        if let Some(to) = &query.to {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(format_timestamp(to)));
        }
        if let Some(min) = query.min_abs_variance_pct {
            sql.push_str(" AND abs_variance_pct >= ?");
            args.push(Box::new(min));
        }

        sql.push_str(" ORDER BY timestamp DESC, abs_variance_pct DESC, open_interest DESC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(limit as i64));
        }

        self.select(&sql, &args)
    }

    /// Top `n` rows by |variance%|, higher open interest first on ties
    pub fn top_by_variance(
        &self,
        n: usize,
        min_abs_variance_pct: Option<f64>,
    ) -> OptionsResult<Vec<AnalysisRecord>> {
        let sql = format!(
            "SELECT {} FROM analysis_records
             WHERE abs_variance_pct >= ?1
             ORDER BY abs_variance_pct DESC, open_interest DESC, contract_id ASC
             LIMIT ?2",
            SELECT_COLUMNS
        );
        let args: Vec<Box<dyn ToSql>> = vec![
            Box::new(min_abs_variance_pct.unwrap_or(0.0)),
            Box::new(n as i64),
        ];
        self.select(&sql, &args)
    }

    /// Solved IVs for one symbol and expiry, oldest run first and by strike
    /// within a run. Rows where the solver failed are left out.
    pub fn iv_history(&self, symbol: &str, expiry: NaiveDate) -> OptionsResult<Vec<IvPoint>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT strike, option_type, solved_iv, implied_volatility, timestamp
                 FROM analysis_records
                 WHERE symbol = ?1 AND expiry = ?2 AND solved_iv IS NOT NULL
                 ORDER BY timestamp ASC, strike ASC, option_type ASC",
            )
            .map_err(|e| OptionsError::storage(format!("Failed to prepare query: {}", e)))?;

        let expiry = expiry.format("%Y-%m-%d").to_string();
        let rows = stmt
            .query_map(params![symbol, expiry], |row| {
                let option_type: String = row.get(1)?;
                let option_type: OptionType = option_type
                    .parse()
                    .map_err(|e: OptionsError| conversion_error(1, e.to_string()))?;
                Ok(IvPoint {
                    strike: row.get(0)?,
                    option_type,
                    solved_iv: row.get(2)?,
                    quoted_iv: row.get(3)?,
                    timestamp: parse_timestamp(row, 4)?,
                })
            })
            .map_err(|e| OptionsError::storage(format!("Failed to execute query: {}", e)))?;

        let points = rows
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| OptionsError::storage(format!("Failed to read row: {}", e)))?;
        debug!("{} IV points for {} {}", points.len(), symbol, expiry);
        Ok(points)
    }

    pub fn summary(&self) -> OptionsResult<StoreSummary> {
        self.conn
            .query_row(
                "SELECT COUNT(*),
                    SUM(option_type = 'call'),
                    SUM(option_type = 'put'),
                    SUM(variance_pct > 0),
                    SUM(variance_pct < 0),
                    COUNT(DISTINCT symbol),
                    AVG(variance_pct),
                    AVG(abs_variance_pct)
                 FROM analysis_records",
                [],
                |row| {
                    let count = |i: usize| -> rusqlite::Result<usize> {
                        Ok(row.get::<_, Option<i64>>(i)?.unwrap_or(0).max(0) as usize)
                    };
                    Ok(StoreSummary {
                        total: count(0)?,
                        calls: count(1)?,
                        puts: count(2)?,
                        overpriced: count(3)?,
                        underpriced: count(4)?,
                        unique_symbols: count(5)?,
                        mean_variance_pct: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                        mean_abs_variance_pct: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
                    })
                },
            )
            .map_err(|e| OptionsError::storage(format!("Failed to summarize: {}", e)))
    }

    pub fn count(&self) -> OptionsResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM analysis_records", [], |row| row.get(0))
            .map_err(|e| OptionsError::storage(format!("Failed to count records: {}", e)))?;
        Ok(n.max(0) as usize)
    }

    /// Remove every stored row (maintenance only)
    pub fn clear(&self) -> OptionsResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM analysis_records", [])
            .map_err(|e| OptionsError::storage(format!("Failed to clear records: {}", e)))?;
        info!("Removed {} analysis records", removed);
        Ok(removed)
    }

    fn select(&self, sql: &str, args: &[Box<dyn ToSql>]) -> OptionsResult<Vec<AnalysisRecord>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| OptionsError::storage(format!("Failed to prepare query: {}", e)))?;

        let arg_refs: Vec<&dyn ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(arg_refs.as_slice(), row_to_record)
            .map_err(|e| OptionsError::storage(format!("Failed to execute query: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| OptionsError::storage(format!("Failed to read row: {}", e)))
    }
}

/// Fixed-width UTC timestamps so text comparison orders chronologically.
/// Nanosecond precision keeps a stored timestamp equal to the one written.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, format!("bad timestamp '{}': {}", raw, e)))
}

fn clamp_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(OptionsError::storage(msg)),
    )
}

fn row_to_record(row: &Row) -> rusqlite::Result<AnalysisRecord> {
    let timestamp = parse_timestamp(row, 2)?;

    let option_type: String = row.get(3)?;
    let option_type: OptionType = option_type
        .parse()
        .map_err(|e: OptionsError| conversion_error(3, e.to_string()))?;

    let expiry: String = row.get(5)?;
    let expiry = NaiveDate::parse_from_str(&expiry, "%Y-%m-%d")
        .map_err(|e| conversion_error(5, format!("bad expiry '{}': {}", expiry, e)))?;

    let volume: i64 = row.get(10)?;
    let open_interest: i64 = row.get(11)?;

    let quote = ContractQuote {
        symbol: row.get(0)?,
        contract_id: row.get(1)?,
        option_type,
        strike: row.get(4)?,
        expiry,
        bid: row.get(6)?,
        ask: row.get(7)?,
        last_price: row.get(8)?,
        implied_volatility: row.get(9)?,
        volume: volume.max(0) as u64,
        open_interest: open_interest.max(0) as u64,
    };

    Ok(AnalysisRecord {
        quote,
        underlying_price: row.get(12)?,
        risk_free_rate: row.get(13)?,
        time_to_expiry: row.get(14)?,
        market_price: row.get(15)?,
        theoretical_price: row.get(16)?,
        variance_pct: row.get(17)?,
        solved_iv: row.get(18)?,
        timestamp,
    })
}
