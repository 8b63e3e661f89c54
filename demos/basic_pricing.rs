//! Example: pricing, Greeks, implied vol, and an offline variance scan
//!
//! Run with: cargo run --example basic_pricing

use chrono::{Duration, Utc};
use option_variance::prelude::*;

fn main() -> OptionsResult<()> {
    let params = OptionParameters::new(500.0, 505.0, 0.25, 0.05, 0.20, OptionType::Call)
        .with_dividend_yield(0.01);

    println!("=== Black-Scholes Pricing ===\n");
    println!("Spot:     ${:.2}", params.spot);
    println!("Strike:   ${:.2}", params.strike);
    println!(
        "Time:     {:.2} years ({:.0} days)",
        params.time_to_expiry,
        params.time_to_expiry * 365.0
    );
    println!("Rate:     {:.1}%", params.rate * 100.0);
    println!("Div:      {:.1}%", params.dividend_yield * 100.0);
    println!("Vol:      {:.1}%\n", params.volatility * 100.0);

    let put = OptionParameters {
        option_type: OptionType::Put,
        ..params
    };
    let call_price = bs_price(&params)?;
    let put_price = bs_price(&put)?;
    println!("Call Price: ${:.4}", call_price);
    println!("Put Price:  ${:.4}", put_price);

    // C - P = S*e^(-qT) - K*e^(-rT)
    let parity_rhs =
        params.spot * params.dividend_factor() - params.strike * params.discount_factor();
    println!("\nPut-Call Parity Check:");
    println!("  C - P = {:.4}", call_price - put_price);
    println!("  S*e^(-qT) - K*e^(-rT) = {:.4}", parity_rhs);

    println!("\n=== Greeks (Call) ===\n");
    let greeks = bs_greeks(&params)?;
    println!("Delta:  {:.4}", greeks.delta);
    println!("Gamma:  {:.4}", greeks.gamma);
    println!("Theta:  {:.4} per day", greeks.theta);
    println!("Vega:   {:.4} per 1% vol", greeks.vega);
    println!("Rho:    {:.4} per 1% rate", greeks.rho);

    println!("\n=== Implied Volatility ===\n");
    let market_price = call_price + 0.50;
    match implied_volatility(&params, market_price) {
        Ok(iv) => println!(
            "Market price ${:.4} implies vol: {:.2}%",
            market_price,
            iv * 100.0
        ),
        Err(e) => println!("Could not solve for IV: {}", e),
    }

    println!("\n=== Offline Variance Scan ===\n");
    let expiry = (Utc::now() + Duration::days(45)).date_naive();
    let quotes: Vec<ContractQuote> = [(480.0, 31.0), (500.0, 22.5), (520.0, 6.0)]
        .iter()
        .map(|&(strike, price)| {
            let id = ContractQuote::occ_symbol("DEMO", expiry, OptionType::Call, strike);
            let mut q = ContractQuote::new("DEMO", id, OptionType::Call, strike, expiry);
            q.bid = Some(price - 0.10);
            q.ask = Some(price + 0.10);
            q.implied_volatility = Some(0.20);
            q.volume = 100;
            q.open_interest = 1000;
            q
        })
        .collect();

    let provider = StaticProvider::new().with_symbol("DEMO", 500.0, quotes);
    let analyzer = VarianceAnalyzer::new(
        MarketDataFetcher::new(&provider),
        VarianceDetector::with_config(DetectorConfig::with_threshold(10.0)),
    );
    let report = analyzer.run(&["DEMO".to_string()], &ExpiryFilter::default(), None)?;

    for r in &report.records {
        println!(
            "{}  market {:>6.2}  model {:>6.2}  {:+.1}%",
            r.quote.contract_id, r.market_price, r.theoretical_price, r.variance_pct
        );
    }
    println!(
        "{} of {} priced contracts flagged",
        report.records.len(),
        report.evaluated
    );

    Ok(())
}
