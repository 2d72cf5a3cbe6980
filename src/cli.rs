//! Command-line interface parsing for fxconv
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! an `AppConfig` for wiring the converter, plus validated conversion requests.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{FileStore, DEFAULT_MAX_AGE_HOURS};
use crate::data::normalize_code;

/// Default exchange-rate endpoint
pub const DEFAULT_API_URL: &str = "https://open.er-api.com/v6/latest";

/// Default URL probed to detect connectivity
pub const DEFAULT_PROBE_URL: &str = "https://open.er-api.com/";

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The amount is not a positive number
    #[error("Invalid amount: '{0}'. Expected a positive number, e.g. 100 or 12.50")]
    InvalidAmount(String),

    /// The currency is not a three-letter code
    #[error("Invalid currency: '{0}'. Expected a three-letter code such as USD")]
    InvalidCurrency(String),

    /// A numeric option is out of range
    #[error("Invalid value for --{0}: must be greater than zero")]
    InvalidOption(&'static str),
}

/// fxconv - Convert currencies with live rates and an offline cache
#[derive(Parser, Debug)]
#[command(name = "fxconv")]
#[command(about = "Currency conversion with live exchange rates and an offline rate cache")]
#[command(version)]
pub struct Cli {
    /// Directory for cached rates, mode flag and history
    #[arg(long, global = true, env = "FXCONV_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Exchange-rate endpoint; the base currency is appended as a path segment
    #[arg(long, global = true, env = "FXCONV_API_URL", value_name = "URL")]
    pub api_url: Option<String>,

    /// URL used to detect whether the network is reachable
    #[arg(long, global = true, env = "FXCONV_PROBE_URL", value_name = "URL")]
    pub probe_url: Option<String>,

    /// Network timeout in seconds
    #[arg(long, global = true, default_value_t = 10, value_name = "SECS")]
    pub timeout_secs: u64,

    /// Cached rates older than this are discarded
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_AGE_HOURS, value_name = "HOURS")]
    pub max_age_hours: i64,

    /// Behave as if the network were unavailable
    #[arg(long, global = true)]
    pub simulate_offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Convert an amount between two currencies
    ///
    /// Examples:
    ///   fxconv convert 100 USD INR
    ///   fxconv convert 12.5 eur gbp
    Convert {
        /// Amount to convert
        #[arg(allow_hyphen_values = true)]
        amount: String,
        /// Currency to convert from
        from: String,
        /// Currency to convert to
        to: String,
    },
    /// Fetch and cache the full rate table for a base currency
    Rates {
        /// Base currency
        #[arg(default_value = "USD")]
        base: String,
    },
    /// Show cache and connectivity status
    Status,
    /// Show or change offline mode
    Mode {
        #[command(subcommand)]
        action: Option<ModeAction>,
    },
    /// Remove cached rates and reset offline mode
    Clear,
    /// Show recent conversions
    History {
        /// Number of entries to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Delete the history instead of showing it
        #[arg(long)]
        clear: bool,
    },
}

/// Offline mode actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeAction {
    /// Print the current mode
    Show,
    /// Switch between online and offline mode
    Toggle,
    /// Leave offline mode (requires a connection)
    Exit,
}

/// Runtime configuration derived from CLI arguments and environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Explicit store directory, `None` for the XDG default
    pub cache_dir: Option<PathBuf>,
    pub api_url: String,
    pub probe_url: String,
    pub timeout: Duration,
    pub max_age: chrono::Duration,
    pub simulate_offline: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            api_url: DEFAULT_API_URL.to_string(),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            timeout: Duration::from_secs(10),
            max_age: chrono::Duration::hours(DEFAULT_MAX_AGE_HOURS),
            simulate_offline: false,
        }
    }
}

impl AppConfig {
    /// Creates an AppConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(AppConfig)` with defaults filled in
    /// * `Err(CliError)` if a numeric option is out of range
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if cli.timeout_secs == 0 {
            return Err(CliError::InvalidOption("timeout-secs"));
        }
        if cli.max_age_hours <= 0 {
            return Err(CliError::InvalidOption("max-age-hours"));
        }

        let defaults = AppConfig::default();
        Ok(AppConfig {
            cache_dir: cli.cache_dir.clone(),
            api_url: cli.api_url.clone().unwrap_or(defaults.api_url),
            probe_url: cli.probe_url.clone().unwrap_or(defaults.probe_url),
            timeout: Duration::from_secs(cli.timeout_secs),
            max_age: chrono::Duration::hours(cli.max_age_hours),
            simulate_offline: cli.simulate_offline,
        })
    }

    /// Opens the file store for this configuration
    ///
    /// Returns `None` when no directory was given and no XDG cache directory
    /// can be determined.
    pub fn store(&self) -> Option<FileStore> {
        match &self.cache_dir {
            Some(dir) => Some(FileStore::with_dir(dir.clone())),
            None => FileStore::new(),
        }
    }
}

/// A validated conversion request
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub amount: f64,
    pub from: String,
    pub to: String,
}

impl ConversionRequest {
    /// Validates the raw `convert` arguments
    pub fn parse(amount: &str, from: &str, to: &str) -> Result<Self, CliError> {
        Ok(Self {
            amount: parse_amount_arg(amount)?,
            from: parse_currency_arg(from)?,
            to: parse_currency_arg(to)?,
        })
    }
}

/// Parses an amount argument; thousands separators are accepted.
///
/// # Returns
/// * `Ok(f64)` for a finite, positive amount
/// * `Err(CliError::InvalidAmount)` otherwise
pub fn parse_amount_arg(s: &str) -> Result<f64, CliError> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    match cleaned.parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        _ => Err(CliError::InvalidAmount(s.to_string())),
    }
}

/// Parses a currency argument into an uppercase code
pub fn parse_currency_arg(s: &str) -> Result<String, CliError> {
    normalize_code(s).ok_or_else(|| CliError::InvalidCurrency(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_arg() {
        assert_eq!(parse_amount_arg("100").unwrap(), 100.0);
        assert_eq!(parse_amount_arg(" 12.5 ").unwrap(), 12.5);
        assert_eq!(parse_amount_arg("1,000").unwrap(), 1000.0);
    }

    #[test]
    fn test_parse_amount_arg_invalid() {
        for input in ["abc", "0", "-5", "", "inf", "NaN"] {
            let result = parse_amount_arg(input);
            assert!(result.is_err(), "'{}' should be rejected", input);
        }
        let err = parse_amount_arg("abc").unwrap_err();
        assert!(err.to_string().contains("Invalid amount"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_parse_currency_arg() {
        assert_eq!(parse_currency_arg("inr").unwrap(), "INR");
        assert!(parse_currency_arg("rupee").is_err());
    }

    #[test]
    fn test_cli_parse_convert() {
        let cli = Cli::parse_from(["fxconv", "convert", "100", "usd", "inr"]);
        assert_eq!(
            cli.command,
            Command::Convert {
                amount: "100".to_string(),
                from: "usd".to_string(),
                to: "inr".to_string(),
            }
        );
        assert!(!cli.simulate_offline);
    }

    #[test]
    fn test_cli_parse_rates_default_base() {
        let cli = Cli::parse_from(["fxconv", "rates"]);
        assert_eq!(
            cli.command,
            Command::Rates {
                base: "USD".to_string()
            }
        );
    }

    #[test]
    fn test_cli_parse_mode_actions() {
        let cli = Cli::parse_from(["fxconv", "mode"]);
        assert_eq!(cli.command, Command::Mode { action: None });

        let cli = Cli::parse_from(["fxconv", "mode", "toggle"]);
        assert_eq!(
            cli.command,
            Command::Mode {
                action: Some(ModeAction::Toggle)
            }
        );
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "fxconv",
            "status",
            "--simulate-offline",
            "--cache-dir",
            "/tmp/fx",
            "--max-age-hours",
            "6",
        ]);
        assert!(cli.simulate_offline);
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/fx")));
        assert_eq!(cli.max_age_hours, 6);
    }

    #[test]
    fn test_app_config_from_cli() {
        let cli = Cli::parse_from([
            "fxconv",
            "status",
            "--api-url",
            "http://localhost:8080/latest",
            "--timeout-secs",
            "3",
        ]);
        let config = AppConfig::from_cli(&cli).unwrap();

        assert_eq!(config.api_url, "http://localhost:8080/latest");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.max_age, chrono::Duration::hours(24));
    }

    #[test]
    fn test_app_config_rejects_zero_timeout() {
        let cli = Cli::parse_from(["fxconv", "status", "--timeout-secs", "0"]);
        assert!(AppConfig::from_cli(&cli).is_err());
    }

    #[test]
    fn test_app_config_store_uses_cache_dir() {
        let cli = Cli::parse_from(["fxconv", "status", "--cache-dir", "/tmp/fxconv-test"]);
        let config = AppConfig::from_cli(&cli).unwrap();

        let store = config.store().expect("Explicit dir always yields a store");
        assert_eq!(store.dir(), std::path::Path::new("/tmp/fxconv-test"));
    }

    #[test]
    fn test_conversion_request_parse() {
        let request = ConversionRequest::parse("2.5", "eur", "inr").unwrap();
        assert_eq!(request.amount, 2.5);
        assert_eq!(request.from, "EUR");
        assert_eq!(request.to, "INR");

        assert!(ConversionRequest::parse("2.5", "euro", "inr").is_err());
    }
}
