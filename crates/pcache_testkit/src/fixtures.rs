//! Test fixtures and store helpers.

use pcache_core::{LocalRecord, LocalStore, StoreConfig};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// An opened store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<LocalStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Opens an in-memory store bound to `workspace`.
    pub fn memory(workspace: &str) -> Self {
        let store = LocalStore::new(workspace, StoreConfig::in_memory())
            .expect("Failed to create in-memory store");
        store.init().expect("Failed to open in-memory store");
        Self {
            store: Arc::new(store),
            _temp_dir: None,
        }
    }

    /// Opens a file-backed store bound to `workspace` in a fresh temp dir.
    pub fn file(workspace: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = LocalStore::new(workspace, StoreConfig::in_dir(temp_dir.path()))
            .expect("Failed to create file store");
        store.init().expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the cache directory if file-backed.
    pub fn dir(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Returns a new handle to the store.
    pub fn shared(&self) -> Arc<LocalStore> {
        Arc::clone(&self.store)
    }
}

impl std::ops::Deref for TestStore {
    type Target = LocalStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Builds a record with a display name and phone number.
pub fn patient(id: &str, name: &str, phone: &str) -> LocalRecord {
    LocalRecord::new(id).with_display_name(name).with_phone(phone)
}

/// The two records used throughout the search examples:
/// `{1, "John Doe", "9812345"}` and `{2, "Johnny", "1112223"}`.
pub fn john_and_johnny() -> Vec<LocalRecord> {
    vec![
        patient("1", "John Doe", "9812345"),
        patient("2", "Johnny", "1112223"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_lives_in_temp_dir() {
        let store = TestStore::file("ws");
        let dir = store.dir().unwrap().to_path_buf();
        store.batch_upsert(john_and_johnny()).unwrap();
        assert!(dir.join("patients_ws.pclog").exists());
    }

    #[test]
    fn memory_store_is_open() {
        let store = TestStore::memory("ws");
        assert!(store.is_open());
        assert!(store.dir().is_none());
    }
}
