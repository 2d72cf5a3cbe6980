//! Conversion history
//!
//! Keeps the most recent conversions as a JSON array in the shared key-value
//! store. Like the rate cache, history is best-effort: storage problems are
//! logged and never fail a conversion.

use thiserror::Error;
use tracing::warn;

use crate::cache::{KeyValueStore, StorageKey, StoreError};
use crate::data::Conversion;

/// Maximum number of conversions kept
pub const HISTORY_LIMIT: usize = 100;

#[derive(Debug, Error)]
enum HistoryError {
    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("could not encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only log of conversions, oldest first
#[derive(Debug)]
pub struct HistoryLog<S> {
    store: S,
    limit: usize,
}

impl<S: KeyValueStore> HistoryLog<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            limit: HISTORY_LIMIT,
        }
    }

    /// Overrides how many entries are retained
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Appends a conversion, dropping the oldest entries past the limit
    pub fn append(&self, conversion: &Conversion) {
        let mut entries = self.entries();
        entries.push(conversion.clone());
        if entries.len() > self.limit {
            let excess = entries.len() - self.limit;
            entries.drain(..excess);
        }

        if let Err(e) = self.write(&entries) {
            warn!(error = %e, "Failed to record conversion history");
        }
    }

    /// Returns all stored conversions, oldest first
    ///
    /// Unreadable history reads as empty.
    pub fn entries(&self) -> Vec<Conversion> {
        let raw = match self.store.get(StorageKey::History) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read conversion history");
                return Vec::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring corrupt conversion history");
            Vec::new()
        })
    }

    /// Returns the newest `count` conversions, newest first
    pub fn recent(&self, count: usize) -> Vec<Conversion> {
        self.entries().into_iter().rev().take(count).collect()
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.delete(StorageKey::History) {
            warn!(error = %e, "Failed to clear conversion history");
        }
    }

    fn write(&self, entries: &[Conversion]) -> Result<(), HistoryError> {
        let json = serde_json::to_string(entries)?;
        self.store.set(StorageKey::History, &json)?;
        Ok(())
    }
}
