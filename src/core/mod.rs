//! Core data types for option analytics
//!
//! Defines fundamental types:
//! - OptionType / OptionParameters: pricing inputs
//! - Greeks: sensitivities
//! - ContractQuote / AnalysisRecord: market rows and their priced form

pub mod option;
pub mod quote;
pub mod greeks;
pub mod error;

pub use option::*;
pub use quote::*;
pub use greeks::*;
pub use error::*;
