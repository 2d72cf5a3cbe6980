//! Key-value storage backends for persisted converter state
//!
//! All persisted state lives under a small fixed set of keys (`StorageKey`).
//! `FileStore` keeps one JSON file per key in an XDG-compliant cache directory,
//! `MemoryStore` keeps everything in a map and is used by tests.

use directories::ProjectDirs;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// The fixed schema of persisted keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    /// Full rate snapshot as JSON
    RateSnapshot,
    /// Millisecond timestamp of the last snapshot save
    LastUpdate,
    /// Persisted offline-mode intent ("true" / "false")
    OfflineMode,
    /// Append-only list of conversions
    History,
}

impl StorageKey {
    /// Returns the on-disk name of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::RateSnapshot => "exchange_rates",
            StorageKey::LastUpdate => "last_update",
            StorageKey::OfflineMode => "offline_mode",
            StorageKey::History => "conversion_history",
        }
    }
}

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the underlying file failed
    #[error("Storage I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The backend is unusable (e.g. a poisoned lock)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// String-valued storage over the fixed key schema
///
/// Implementations are expected to be cheap and synchronous. Callers in this
/// crate never propagate `StoreError` beyond the cache layer.
pub trait KeyValueStore {
    /// Reads the value for `key`, `Ok(None)` when absent
    fn get(&self, key: StorageKey) -> Result<Option<String>, StoreError>;

    /// Writes `value` under `key`, replacing any existing value
    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError>;

    /// Removes `key`; removing a missing key is not an error
    fn delete(&self, key: StorageKey) -> Result<(), StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn delete(&self, key: StorageKey) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

/// Stores each key as `<key>.json` inside a directory
///
/// Every value written by this crate is itself valid JSON (objects, numbers
/// and booleans), hence the extension.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where the files are stored
    dir: PathBuf,
}

impl FileStore {
    /// Creates a FileStore using the XDG-compliant cache directory
    ///
    /// Uses `~/.cache/fxconv/` on Linux, or the equivalent path on other platforms.
    /// Returns `None` if the directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "fxconv")?;
        Some(Self {
            dir: project_dirs.cache_dir().to_path_buf(),
        })
    }

    /// Creates a FileStore rooted at a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Returns the directory backing this store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: StorageKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn delete(&self, key: StorageKey) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store, mainly for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StoreError> {
        let values = self
            .values
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(values.get(&key).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StoreError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        values.insert(key, value.to_string());
        Ok(())
    }

    fn delete(&self, key: StorageKey) -> Result<(), StoreError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        values.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::with_dir(temp_dir.path().to_path_buf());
        (store, temp_dir)
    }

    #[test]
    fn test_set_creates_file_in_store_directory() {
        let (store, temp_dir) = create_test_store();

        store
            .set(StorageKey::OfflineMode, "true")
            .expect("Write should succeed");

        let expected_path = temp_dir.path().join("offline_mode.json");
        assert!(expected_path.exists(), "Store file should exist");
        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert_eq!(content, "true");
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (store, _temp_dir) = create_test_store();

        let result = store.get(StorageKey::RateSnapshot).expect("Read should succeed");

        assert!(result.is_none(), "Should return None for missing key");
    }

    #[test]
    fn test_set_creates_directory_if_missing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested_path = temp_dir.path().join("nested").join("store");
        let store = FileStore::with_dir(nested_path.clone());

        store
            .set(StorageKey::LastUpdate, "1700000000000")
            .expect("Write should succeed");

        assert!(nested_path.join("last_update.json").exists());
    }

    #[test]
    fn test_overwrite_and_delete() {
        let (store, _temp_dir) = create_test_store();

        store.set(StorageKey::OfflineMode, "true").unwrap();
        store.set(StorageKey::OfflineMode, "false").unwrap();
        assert_eq!(
            store.get(StorageKey::OfflineMode).unwrap().as_deref(),
            Some("false")
        );

        store.delete(StorageKey::OfflineMode).unwrap();
        assert!(store.get(StorageKey::OfflineMode).unwrap().is_none());

        // Deleting again is fine
        store.delete(StorageKey::OfflineMode).unwrap();
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(store) = FileStore::new() {
            let path_str = store.dir().to_string_lossy();
            assert!(path_str.contains("fxconv"), "Store path should contain project name");
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();

        assert!(store.get(StorageKey::History).unwrap().is_none());
        store.set(StorageKey::History, "[]").unwrap();
        assert_eq!(store.get(StorageKey::History).unwrap().as_deref(), Some("[]"));
        store.delete(StorageKey::History).unwrap();
        assert!(store.get(StorageKey::History).unwrap().is_none());
    }

    #[test]
    fn test_arc_store_shares_state() {
        let store = Arc::new(MemoryStore::new());
        let other = Arc::clone(&store);

        store.set(StorageKey::OfflineMode, "true").unwrap();

        assert_eq!(other.get(StorageKey::OfflineMode).unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn test_storage_keys_are_distinct() {
        let keys = [
            StorageKey::RateSnapshot,
            StorageKey::LastUpdate,
            StorageKey::OfflineMode,
            StorageKey::History,
        ];

        for (i, a) in keys.iter().enumerate() {
            for (j, b) in keys.iter().enumerate() {
                if i != j {
                    assert_ne!(a.as_str(), b.as_str());
                }
            }
        }
    }
}
