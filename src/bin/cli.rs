//! Option Analyzer CLI
//!
//! Fetches option chains, flags contracts whose market price strays from
//! Black-Scholes, and keeps a history of them in SQLite.

use std::process;

use clap::Parser;

use option_variance::cli::{run, Cli};

fn main() {
    let cli = Cli::parse();
    cli.init_logging();

    match run(&cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
