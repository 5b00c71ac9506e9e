//! In-memory storage backend.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{StorageBackend, StorageError};

/// HashMap-backed store with an optional byte capacity.
///
/// Used by tests and by ephemeral (unsaved) sessions. Capacity accounting
/// counts value bytes, matching what the file store measures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    capacity_bytes: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes once `capacity_bytes` would be
    /// exceeded.
    pub fn with_capacity(capacity_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity_bytes: Some(capacity_bytes),
        }
    }

    fn used_bytes(entries: &HashMap<String, String>, excluding: &str) -> usize {
        entries
            .iter()
            .filter(|(key, _)| key.as_str() != excluding)
            .map(|(_, value)| value.len())
            .sum()
    }
}

impl StorageBackend for MemoryStore {
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().expect("memory store lock poisoned");

        if let Some(capacity) = self.capacity_bytes
            && Self::used_bytes(&entries, key) + value.len() > capacity
        {
            return Err(StorageError::QuotaExceeded);
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn read(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .expect("memory store lock poisoned")
            .get(key)
            .cloned()
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .expect("memory store lock poisoned")
            .remove(key);
    }

    fn clear(&self) {
        self.entries
            .lock()
            .expect("memory store lock poisoned")
            .clear();
    }
}
