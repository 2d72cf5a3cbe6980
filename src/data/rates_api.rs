//! Exchange rate API client
//!
//! This module fetches full rate tables from an open exchange-rate API
//! (`https://open.er-api.com/v6/latest/{BASE}`) and parses them into
//! `RateTable`s.

use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::RateTable;

/// Base URL for the exchange-rate API
const DEFAULT_BASE_URL: &str = "https://open.er-api.com/v6/latest";

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur when fetching rates
#[derive(Debug, Error)]
pub enum RatesApiError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The API answered with an error result
    #[error("Rates API returned an error: {0}")]
    Api(String),

    /// The API does not know the currency
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),
}

/// Response body of the `latest` endpoint
#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    base_code: Option<String>,
    #[serde(default)]
    rates: BTreeMap<String, f64>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
}

/// Anything that can supply live exchange rates
#[allow(async_fn_in_trait)]
pub trait RateProvider {
    /// Fetches every rate relative to `base`
    async fn fetch_table(&self, base: &str) -> Result<RateTable, RatesApiError>;

    /// Fetches the single rate for `from` → `to`
    async fn fetch_pair(&self, from: &str, to: &str) -> Result<f64, RatesApiError> {
        let table = self.fetch_table(from).await?;
        table
            .rate_for(to)
            .ok_or_else(|| RatesApiError::UnknownCurrency(to.to_string()))
    }
}

/// Client for the open exchange-rate API
#[derive(Debug, Clone)]
pub struct RatesClient {
    client: Client,
    base_url: String,
}

impl Default for RatesClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RatesClient {
    /// Create a new RatesClient with default settings
    pub fn new() -> Self {
        Self::with_options(DEFAULT_BASE_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a RatesClient against a custom endpoint and timeout
    pub fn with_options(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client, using defaults without a timeout");
                Client::new()
            });
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl RateProvider for RatesClient {
    async fn fetch_table(&self, base: &str) -> Result<RateTable, RatesApiError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), base);
        debug!(%url, "Fetching exchange rates");

        let response = self.client.get(&url).send().await?;
        let text = response.text().await?;

        parse_latest(&text, base)
    }
}

/// Parses a `latest` response body for the requested base
fn parse_latest(text: &str, requested_base: &str) -> Result<RateTable, RatesApiError> {
    let response: LatestResponse = serde_json::from_str(text)?;

    if response.result != "success" {
        let error_type = response
            .error_type
            .unwrap_or_else(|| "unknown error".to_string());
        if error_type == "unsupported-code" {
            return Err(RatesApiError::UnknownCurrency(requested_base.to_string()));
        }
        return Err(RatesApiError::Api(error_type));
    }

    let base_currency = response
        .base_code
        .unwrap_or_else(|| requested_base.to_string())
        .to_ascii_uppercase();

    Ok(RateTable {
        base_currency,
        rates: response.rates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SUCCESS_BODY: &str = r#"{
        "result": "success",
        "base_code": "USD",
        "time_last_update_unix": 1700000000,
        "rates": {"USD": 1, "INR": 83.0, "EUR": 0.92}
    }"#;

    /// Serves a single canned HTTP response on a local port
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });

        format!("http://{}/v6/latest", addr)
    }

    #[test]
    fn test_parse_success_response() {
        let table = parse_latest(SUCCESS_BODY, "usd").unwrap();

        assert_eq!(table.base_currency, "USD");
        assert_eq!(table.rates.len(), 3);
        assert_relative_eq!(table.rates["INR"], 83.0);
    }

    #[test]
    fn test_parse_unsupported_code() {
        let body = r#"{"result": "error", "error-type": "unsupported-code"}"#;

        let result = parse_latest(body, "XYZ");

        assert!(matches!(result, Err(RatesApiError::UnknownCurrency(code)) if code == "XYZ"));
    }

    #[test]
    fn test_parse_other_api_error() {
        let body = r#"{"result": "error", "error-type": "rate-limited"}"#;

        let result = parse_latest(body, "USD");

        assert!(matches!(result, Err(RatesApiError::Api(kind)) if kind == "rate-limited"));
    }

    #[test]
    fn test_parse_invalid_json() {
        let result = parse_latest("<html>gateway timeout</html>", "USD");

        assert!(matches!(result, Err(RatesApiError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_fetch_table_from_local_server() {
        let url = serve_once("200 OK", SUCCESS_BODY).await;
        let client = RatesClient::with_options(url, Duration::from_secs(5));

        let table = client.fetch_table("USD").await.unwrap();

        assert_eq!(table.base_currency, "USD");
        assert_relative_eq!(table.rate_for("EUR").unwrap(), 0.92);
    }

    #[tokio::test]
    async fn test_fetch_pair_uses_table() {
        let url = serve_once("200 OK", SUCCESS_BODY).await;
        let client = RatesClient::with_options(url, Duration::from_secs(5));

        let rate = client.fetch_pair("USD", "INR").await.unwrap();

        assert_relative_eq!(rate, 83.0);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_server_fails() {
        let client = RatesClient::with_options("http://127.0.0.1:9/v6/latest", Duration::from_millis(500));

        let result = client.fetch_table("USD").await;

        assert!(matches!(result, Err(RatesApiError::RequestFailed(_))));
    }

    #[tokio::test]
    async fn test_fetch_honours_configured_timeout() {
        // Accepts the connection but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let client = RatesClient::with_options(format!("http://{}/v6/latest", addr), Duration::from_millis(200));

        let result = tokio::time::timeout(Duration::from_secs(5), client.fetch_table("USD"))
            .await
            .expect("Client timeout should fire before the guard");

        assert!(matches!(result, Err(RatesApiError::RequestFailed(_))));
    }

    #[test]
    fn test_default_client_uses_public_endpoint() {
        let client = RatesClient::default();
        assert!(client.base_url().starts_with("https://"));
    }
}
