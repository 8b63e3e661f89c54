//! CSV export of analysis records

use std::io;
use std::path::Path;

use tracing::info;

use crate::core::{AnalysisRecord, OptionsResult};

pub const CSV_HEADER: [&str; 10] = [
    "symbol",
    "type",
    "strike",
    "current",
    "bs_price",
    "variance_pct",
    "iv",
    "volume",
    "oi",
    "expiry",
];

/// Write records to `path`, replacing any existing file
pub fn write_csv(path: impl AsRef<Path>, records: &[AnalysisRecord]) -> OptionsResult<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)?;
    write_records(&mut writer, records)?;
    info!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Write header and rows to any CSV writer
pub fn write_records<W: io::Write>(
    writer: &mut csv::Writer<W>,
    records: &[AnalysisRecord],
) -> OptionsResult<()> {
    writer.write_record(CSV_HEADER)?;

    for record in records {
        let q = &record.quote;
        writer.write_record([
            q.symbol.clone(),
            q.option_type.as_str().to_string(),
            format!("{:.2}", q.strike),
            format!("{:.4}", record.market_price),
            format!("{:.4}", record.theoretical_price),
            format!("{:.2}", record.variance_pct),
            q.implied_volatility
                .map(|iv| format!("{:.4}", iv))
                .unwrap_or_default(),
            q.volume.to_string(),
            q.open_interest.to_string(),
            q.expiry.format("%Y-%m-%d").to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
