//! Persistent rate cache
//!
//! This module stores the most recent exchange rate table in a key-value store
//! with a 24 hour expiry window, and resolves currency pairs from it when the
//! live API cannot or should not be used. The same store also carries the
//! persisted offline-mode flag and the conversion history.

mod rates;
mod store;

pub use rates::{CacheStatus, ModeRepository, RateCache, RateSnapshot, DEFAULT_MAX_AGE_HOURS};
pub use store::{FileStore, KeyValueStore, MemoryStore, StorageKey, StoreError};
