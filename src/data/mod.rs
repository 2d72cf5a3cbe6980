//! Core data models for fxconv
//!
//! This module contains the data types shared between the live rates client,
//! the converter, and the conversion history.

pub mod rates_api;

pub use rates_api::{RateProvider, RatesApiError, RatesClient};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A full rate table as returned by the live API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    /// Currency all rates are relative to
    pub base_currency: String,
    /// Units of each currency bought by one unit of the base
    pub rates: BTreeMap<String, f64>,
}

impl RateTable {
    /// Returns the rate from the base to `code`
    ///
    /// The base itself always converts at 1.
    pub fn rate_for(&self, code: &str) -> Option<f64> {
        if code == self.base_currency {
            return Some(1.0);
        }
        self.rates
            .get(code)
            .copied()
            .filter(|rate| rate.is_finite() && *rate > 0.0)
    }
}

/// Where the rate used for a conversion came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    /// Fetched from the API for this conversion
    Live,
    /// Resolved from the local rate cache
    Cache,
}

impl fmt::Display for RateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateSource::Live => f.write_str("live"),
            RateSource::Cache => f.write_str("cached"),
        }
    }
}

/// One completed conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub amount: f64,
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub result: f64,
    pub source: RateSource,
    pub converted_at: DateTime<Utc>,
}

impl Conversion {
    pub fn new(amount: f64, from: &str, to: &str, rate: f64, source: RateSource) -> Self {
        Self {
            amount,
            from: from.to_string(),
            to: to.to_string(),
            rate,
            result: amount * rate,
            source,
            converted_at: Utc::now(),
        }
    }
}

impl fmt::Display for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2} {} = {:.2} {} (rate {:.6}, {})",
            self.amount, self.from, self.result, self.to, self.rate, self.source
        )
    }
}

/// Normalizes a user-supplied currency code
///
/// Accepts three ASCII letters in any case, surrounded by optional whitespace.
pub fn normalize_code(code: &str) -> Option<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(code.to_ascii_uppercase())
    } else {
        None
    }
}
