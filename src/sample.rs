//! Deterministic demo records for exercising the store and CLI offline

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::OptionType::{Call, Put};
use crate::core::{AnalysisRecord, ContractQuote, OptionType, DAYS_PER_YEAR};
use crate::detector::variance_pct;

/// Days from `as_of` to each sample expiry
pub const SAMPLE_EXPIRY_DAYS: [i64; 3] = [30, 60, 90];

const SAMPLE_RATE: f64 = 0.05;
const HALF_SPREAD: f64 = 0.05;

struct SampleContract {
    strike: f64,
    option_type: OptionType,
    price: f64,
    theoretical: f64,
    volume: u64,
    iv: f64,
}

const fn contract(
    strike: f64,
    option_type: OptionType,
    price: f64,
    theoretical: f64,
    volume: u64,
    iv: f64,
) -> SampleContract {
    SampleContract {
        strike,
        option_type,
        price,
        theoretical,
        volume,
        iv,
    }
}

const SAMPLE_BOOK: [(&str, f64, [SampleContract; 6]); 3] = [
    (
        "SPY",
        445.50,
        [
            contract(440.0, Call, 8.50, 6.20, 1500, 0.18),
            contract(440.0, Put, 3.20, 2.80, 1200, 0.19),
            contract(450.0, Call, 3.80, 2.90, 2000, 0.17),
            contract(450.0, Put, 8.20, 7.50, 1800, 0.20),
            contract(460.0, Call, 1.20, 0.95, 2500, 0.16),
            contract(460.0, Put, 15.80, 14.20, 900, 0.21),
        ],
    ),
    (
        "AAPL",
        175.30,
        [
            contract(170.0, Call, 8.50, 6.20, 1800, 0.25),
            contract(170.0, Put, 3.20, 2.80, 1500, 0.26),
            contract(175.0, Call, 5.20, 3.80, 2200, 0.24),
            contract(175.0, Put, 5.80, 4.20, 1900, 0.27),
            contract(180.0, Call, 2.80, 2.10, 2800, 0.23),
            contract(180.0, Put, 9.50, 8.80, 1200, 0.28),
        ],
    ),
    (
        "TSLA",
        185.00,
        [
            contract(180.0, Call, 12.50, 9.20, 1600, 0.40),
            contract(180.0, Put, 7.20, 5.80, 1400, 0.42),
            contract(190.0, Call, 8.50, 6.20, 2000, 0.38),
            contract(190.0, Put, 12.80, 11.50, 1100, 0.44),
            contract(200.0, Call, 5.20, 3.80, 2500, 0.36),
            contract(200.0, Put, 18.50, 16.80, 800, 0.46),
        ],
    ),
];

/// Fixed SPY/AAPL/TSLA book expanded over three expiries.
///
/// Prices and theoretical values come from a fixed table; only open
/// interest is jittered, reproducibly for a given `seed`.
pub fn sample_records(as_of: DateTime<Utc>, seed: u64) -> Vec<AnalysisRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let today = as_of.date_naive();
    let mut records = Vec::with_capacity(SAMPLE_BOOK.len() * 6 * SAMPLE_EXPIRY_DAYS.len());

    for (symbol, spot, contracts) in SAMPLE_BOOK.iter() {
        for c in contracts.iter() {
            for days in SAMPLE_EXPIRY_DAYS {
                let expiry = today + Duration::days(days);
                let id = ContractQuote::occ_symbol(symbol, expiry, c.option_type, c.strike);

                let mut quote = ContractQuote::new(*symbol, id, c.option_type, c.strike, expiry);
                quote.bid = Some(c.price - HALF_SPREAD);
                quote.ask = Some(c.price + HALF_SPREAD);
                quote.last_price = Some(c.price);
                quote.implied_volatility = Some(c.iv);
                quote.volume = c.volume;
                quote.open_interest = c.volume + rng.gen_range(0..=500);

                records.push(AnalysisRecord {
                    quote,
                    underlying_price: *spot,
                    risk_free_rate: SAMPLE_RATE,
                    time_to_expiry: days as f64 / DAYS_PER_YEAR,
                    market_price: c.price,
                    theoretical_price: c.theoretical,
                    variance_pct: variance_pct(c.price, c.theoretical).unwrap_or(0.0),
                    solved_iv: None,
                    timestamp: as_of,
                });
            }
        }
    }

    records
}
