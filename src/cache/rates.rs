//! Single-slot exchange rate cache
//!
//! `RateCache` persists the latest full rate table for one base currency and
//! answers pair queries from it by direct lookup, inverse lookup, or a cross
//! rate through the base. Caching is best-effort: storage failures are logged
//! and degrade to "no cache", they never reach the caller.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::store::{KeyValueStore, StorageKey, StoreError};

/// Snapshots older than this are discarded on read
pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

/// The latest rate table, relative to `base_currency`
///
/// `rates[code]` is how many units of `code` one unit of the base buys.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    pub rates: BTreeMap<String, f64>,
    pub base_currency: String,
    pub captured_at: DateTime<Utc>,
}

impl RateSnapshot {
    /// Resolves the rate for converting `from` into `to`
    ///
    /// First match wins: direct (`from` is the base), inverse (`to` is the
    /// base), then cross rate when both codes are cached. A base-to-base query
    /// finds no cached entry and returns `None`.
    pub fn rate(&self, from: &str, to: &str) -> Option<f64> {
        let from = normalize(from);
        let to = normalize(to);

        if from == self.base_currency {
            if let Some(rate) = self.lookup(&to) {
                return Some(rate);
            }
        }

        if to == self.base_currency {
            if let Some(rate) = self.lookup(&from) {
                return Some(1.0 / rate);
            }
        }

        match (self.lookup(&from), self.lookup(&to)) {
            (Some(from_rate), Some(to_rate)) => Some(to_rate / from_rate),
            _ => None,
        }
    }

    /// Non-positive or non-finite entries count as missing
    fn lookup(&self, code: &str) -> Option<f64> {
        self.rates
            .get(code)
            .copied()
            .filter(|rate| rate.is_finite() && *rate > 0.0)
    }
}

/// Read-only cache status for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub has_snapshot: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub base_currency: Option<String>,
    pub rate_count: usize,
    pub is_expired: bool,
}

/// Persisted form of a snapshot
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSnapshot {
    rates: BTreeMap<String, f64>,
    base_currency: String,
    /// Milliseconds since the epoch
    timestamp: i64,
    last_update: String,
}

#[derive(Debug, Error)]
enum SnapshotError {
    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("corrupt snapshot: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("snapshot timestamp out of range: {0}")]
    InvalidTimestamp(i64),
}

/// Persisted "offline mode" intent
pub trait ModeRepository {
    /// Reads the flag; missing or unreadable values read as `false`
    fn offline_mode(&self) -> bool;

    /// Persists the flag, best-effort
    fn set_offline_mode(&self, enabled: bool);
}

impl<T: ModeRepository + ?Sized> ModeRepository for Arc<T> {
    fn offline_mode(&self) -> bool {
        (**self).offline_mode()
    }

    fn set_offline_mode(&self, enabled: bool) {
        (**self).set_offline_mode(enabled)
    }
}

/// Best-effort, single-slot rate cache on top of a `KeyValueStore`
#[derive(Debug)]
pub struct RateCache<S> {
    store: S,
    max_age: Duration,
}

impl<S: KeyValueStore> RateCache<S> {
    /// Creates a cache with the default 24 hour expiry window
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_age: Duration::hours(DEFAULT_MAX_AGE_HOURS),
        }
    }

    /// Overrides the expiry window
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Returns the backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replaces the stored snapshot with `rates` relative to `base_currency`
    ///
    /// Codes are uppercased. Entries that are not strictly positive, and the
    /// base currency's own entry, are dropped. If nothing valid remains the
    /// existing snapshot is left alone. Storage failures are logged only.
    pub fn save<I, K>(&self, rates: I, base_currency: &str)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        self.save_at(rates, base_currency, Utc::now());
    }

    fn save_at<I, K>(&self, rates: I, base_currency: &str, captured_at: DateTime<Utc>)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let base_currency = normalize(base_currency);
        if base_currency.is_empty() {
            warn!("Refusing to cache rates without a base currency");
            return;
        }

        let mut valid = BTreeMap::new();
        for (code, rate) in rates {
            let code = normalize(code.as_ref());
            if code.is_empty() || code == base_currency {
                continue;
            }
            if !rate.is_finite() || rate <= 0.0 {
                warn!(code = %code, rate, "Dropping invalid rate");
                continue;
            }
            valid.insert(code, rate);
        }

        if valid.is_empty() {
            warn!(base = %base_currency, "No valid rates to cache");
            return;
        }

        let timestamp = captured_at.timestamp_millis();
        let stored = StoredSnapshot {
            rates: valid,
            base_currency,
            timestamp,
            last_update: captured_at.to_rfc3339(),
        };

        let result = serde_json::to_string(&stored)
            .map_err(SnapshotError::from)
            .and_then(|json| {
                self.store.set(StorageKey::RateSnapshot, &json)?;
                self.store
                    .set(StorageKey::LastUpdate, &timestamp.to_string())?;
                Ok(())
            });

        match result {
            Ok(()) => debug!(
                base = %stored.base_currency,
                count = stored.rates.len(),
                "Cached exchange rates"
            ),
            Err(e) => warn!(error = %e, "Failed to cache exchange rates"),
        }
    }

    /// Returns the stored snapshot if it is present and fresh
    ///
    /// This read may mutate storage: an expired or corrupt snapshot is purged
    /// together with the last-update timestamp and the offline-mode flag.
    pub fn load(&self) -> Option<RateSnapshot> {
        let now = Utc::now();

        // The plain timestamp is cheaper to check than the full snapshot
        if self.is_expired(None, now) {
            debug!("Rate cache expired");
            self.purge();
            return None;
        }

        match self.read_snapshot() {
            Ok(Some(snapshot)) if self.is_expired(Some(snapshot.captured_at), now) => {
                debug!(captured_at = %snapshot.captured_at, "Rate cache expired");
                self.purge();
                None
            }
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable rate cache");
                self.purge();
                None
            }
        }
    }

    /// Looks up the rate for `from` → `to` in the current snapshot
    ///
    /// `None` is the normal "no cached rate for this pair" outcome, also
    /// returned when there is no usable snapshot at all.
    pub fn get_rate(&self, from: &str, to: &str) -> Option<f64> {
        self.load()?.rate(from, to)
    }

    /// Removes the snapshot, its timestamp, and the offline-mode flag
    pub fn clear(&self) {
        self.purge();
    }

    /// Reports the cache state without modifying it
    pub fn describe(&self) -> CacheStatus {
        match self.read_snapshot() {
            Ok(Some(snapshot)) => CacheStatus {
                has_snapshot: true,
                last_update: Some(snapshot.captured_at),
                is_expired: self.is_expired(Some(snapshot.captured_at), Utc::now()),
                rate_count: snapshot.rates.len(),
                base_currency: Some(snapshot.base_currency),
            },
            Ok(None) | Err(_) => CacheStatus {
                has_snapshot: false,
                last_update: None,
                base_currency: None,
                rate_count: 0,
                is_expired: false,
            },
        }
    }

    /// Expiry as seen by both `load` and `describe`
    ///
    /// The last-update key and the snapshot's own timestamp are written
    /// separately, so either one being too old expires the cache.
    fn is_expired(&self, captured_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let last_update_stale = self
            .read_last_update()
            .is_some_and(|last_update| self.is_stale(last_update, now));
        last_update_stale || captured_at.is_some_and(|captured_at| self.is_stale(captured_at, now))
    }

    fn is_stale(&self, captured_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(captured_at) > self.max_age
    }

    fn read_last_update(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.get(StorageKey::LastUpdate).ok()??;
        let millis = raw.trim().parse::<i64>().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    fn read_snapshot(&self) -> Result<Option<RateSnapshot>, SnapshotError> {
        let Some(raw) = self.store.get(StorageKey::RateSnapshot)? else {
            return Ok(None);
        };

        let stored: StoredSnapshot = serde_json::from_str(&raw)?;
        let captured_at = Utc
            .timestamp_millis_opt(stored.timestamp)
            .single()
            .ok_or(SnapshotError::InvalidTimestamp(stored.timestamp))?;

        Ok(Some(RateSnapshot {
            rates: stored.rates,
            base_currency: normalize(&stored.base_currency),
            captured_at,
        }))
    }

    fn purge(&self) {
        for key in [
            StorageKey::RateSnapshot,
            StorageKey::LastUpdate,
            StorageKey::OfflineMode,
        ] {
            if let Err(e) = self.store.delete(key) {
                warn!(key = key.as_str(), error = %e, "Failed to clear cache entry");
            }
        }
    }
}

impl<S: KeyValueStore> ModeRepository for RateCache<S> {
    fn offline_mode(&self) -> bool {
        matches!(
            self.store.get(StorageKey::OfflineMode),
            Ok(Some(value)) if value.trim() == "true"
        )
    }

    fn set_offline_mode(&self, enabled: bool) {
        let value = if enabled { "true" } else { "false" };
        if let Err(e) = self.store.set(StorageKey::OfflineMode, value) {
            warn!(error = %e, "Failed to persist offline mode");
        }
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
