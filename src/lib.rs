//! Journey Engine library crate.
//!
//! Attendance-based working time calculation under CLT rules: punches
//! are normalised into daily records, split into regular, overtime,
//! night and rest-day minutes, valued against the contract salary,
//! banked in a compensatory time ledger and checked for compliance
//! violations.  [`engine::JourneyEngine`] ties the pieces together;
//! [`api::build_router`] exposes it over HTTP.

pub mod models;
pub mod config;
pub mod error;
pub mod store;
pub mod normalizer;
pub mod journey;
pub mod monthly;
pub mod valuation;
pub mod time_bank;
pub mod violations;
pub mod rollup;
pub mod engine;
pub mod api;

pub use error::{Error, Result};
