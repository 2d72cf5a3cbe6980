//! Conversion flow
//!
//! `Converter` asks the mode controller whether to trust the cache, fetches
//! live rates otherwise (saving the full table for later offline use), falls
//! back to the cache when the live fetch fails, and records every successful
//! conversion in the history.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{CacheStatus, KeyValueStore, RateCache};
use crate::connectivity::{ConnectivitySource, Mode, ModeController, ModeError};
use crate::data::{normalize_code, Conversion, RateProvider, RateSource, RateTable, RatesApiError};
use crate::history::HistoryLog;

/// Errors that can occur during a conversion
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The amount is not a positive number
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    /// The currency code is not three letters
    #[error("Invalid currency code: '{0}'")]
    InvalidCurrency(String),

    /// Offline and the cache cannot answer for this pair
    #[error("No cached rate for {from} to {to}")]
    NoCachedRate { from: String, to: String },

    /// The live fetch failed and the cache cannot answer either
    #[error("Live rates unavailable and no cached rate for {from} to {to}: {source}")]
    Unavailable {
        from: String,
        to: String,
        #[source]
        source: RatesApiError,
    },

    /// A live-only operation was requested while offline
    #[error("Offline mode is active")]
    Offline,

    /// Refreshing the rate table failed
    #[error(transparent)]
    Rates(#[from] RatesApiError),
}

/// Snapshot of cache and connectivity state for display
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub cache: CacheStatus,
    pub mode: Mode,
    pub connected: bool,
}

/// Converts amounts using live or cached rates
#[derive(Debug)]
pub struct Converter<S, P, C> {
    cache: Arc<RateCache<S>>,
    history: HistoryLog<S>,
    provider: P,
    controller: ModeController<Arc<RateCache<S>>, C>,
}

impl<S, P, C> Converter<S, P, C>
where
    S: KeyValueStore,
    P: RateProvider,
    C: ConnectivitySource,
{
    /// Takes a fresh connectivity reading, then builds the converter
    ///
    /// The starting mode depends on that reading, so use this for any source
    /// whose current state is not already known.
    pub async fn connect(cache: RateCache<S>, history: HistoryLog<S>, provider: P, source: C) -> Self {
        source.check().await;
        Self::new(cache, history, provider, source)
    }

    /// Builds the converter from the source's current reading
    pub fn new(cache: RateCache<S>, history: HistoryLog<S>, provider: P, source: C) -> Self {
        let cache = Arc::new(cache);
        let controller = ModeController::new(Arc::clone(&cache), source);
        Self {
            cache,
            history,
            provider,
            controller,
        }
    }

    pub fn cache(&self) -> &RateCache<S> {
        &self.cache
    }

    pub fn controller(&self) -> &ModeController<Arc<RateCache<S>>, C> {
        &self.controller
    }

    /// Converts `amount` of `from` into `to`
    pub async fn convert(
        &mut self,
        amount: f64,
        from: &str,
        to: &str,
    ) -> Result<Conversion, ConvertError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ConvertError::InvalidAmount(amount));
        }
        let from = normalize_code(from).ok_or_else(|| ConvertError::InvalidCurrency(from.to_string()))?;
        let to = normalize_code(to).ok_or_else(|| ConvertError::InvalidCurrency(to.to_string()))?;

        self.sync_connectivity().await;

        let conversion = if self.controller.should_use_cache() {
            let rate = self
                .cache
                .get_rate(&from, &to)
                .ok_or_else(|| ConvertError::NoCachedRate {
                    from: from.clone(),
                    to: to.clone(),
                })?;
            Conversion::new(amount, &from, &to, rate, RateSource::Cache)
        } else {
            match self.fetch_live(&from, &to).await {
                Ok(rate) => Conversion::new(amount, &from, &to, rate, RateSource::Live),
                Err(error) => {
                    warn!(%error, "Live rate fetch failed, falling back to cache");
                    match self.cache.get_rate(&from, &to) {
                        Some(rate) => Conversion::new(amount, &from, &to, rate, RateSource::Cache),
                        None => {
                            return Err(ConvertError::Unavailable {
                                from,
                                to,
                                source: error,
                            })
                        }
                    }
                }
            }
        };

        info!(
            from = %conversion.from,
            to = %conversion.to,
            rate = conversion.rate,
            source = %conversion.source,
            "Converted"
        );
        self.history.append(&conversion);
        Ok(conversion)
    }

    /// Fetches and caches the full rate table for `base`
    pub async fn refresh(&mut self, base: &str) -> Result<RateTable, ConvertError> {
        let base = normalize_code(base).ok_or_else(|| ConvertError::InvalidCurrency(base.to_string()))?;

        self.sync_connectivity().await;
        if self.controller.should_use_cache() {
            return Err(ConvertError::Offline);
        }

        let table = self.provider.fetch_table(&base).await?;
        self.store_table(&table);
        Ok(table)
    }

    pub async fn status(&mut self) -> StatusReport {
        self.sync_connectivity().await;
        StatusReport {
            cache: self.cache.describe(),
            mode: self.controller.mode(),
            connected: self.controller.is_online(),
        }
    }

    /// Flips between online and manual offline mode
    pub async fn toggle_offline(&mut self) -> Result<Mode, ModeError> {
        self.sync_connectivity().await;
        self.controller.toggle()
    }

    pub async fn exit_offline(&mut self) -> Result<(), ModeError> {
        self.sync_connectivity().await;
        self.controller.exit_offline()
    }

    /// Clears cached rates and the offline flag, then re-derives the mode
    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.controller.reconcile();
    }

    /// Newest `count` conversions, newest first
    pub fn history(&self, count: usize) -> Vec<Conversion> {
        self.history.recent(count)
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }

    async fn sync_connectivity(&mut self) {
        self.controller.source().check().await;
        self.controller.poll_events();
    }

    async fn fetch_live(&self, from: &str, to: &str) -> Result<f64, RatesApiError> {
        let table = self.provider.fetch_table(from).await?;
        self.store_table(&table);
        table
            .rate_for(to)
            .ok_or_else(|| RatesApiError::UnknownCurrency(to.to_string()))
    }

    fn store_table(&self, table: &RateTable) {
        self.cache.save(
            table.rates.iter().map(|(code, rate)| (code.as_str(), *rate)),
            &table.base_currency,
        );
    }
}
