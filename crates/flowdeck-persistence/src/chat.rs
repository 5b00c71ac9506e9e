//! Chat history persistence lane.
//!
//! Chat entries are saved immediately, never debounced, and never go
//! through the serialization worker — they are small and user-visible
//! right away. One record per entry, plus an index of ids.
//!
//! The index owns the lifecycle. On save the record is written before the
//! index (the index must never list an id without a record); on delete the
//! id is delisted before the record is removed. The two writes are not
//! transactional, so a stale record can survive under its key — readers
//! treat any id absent from the index as nonexistent.

use std::sync::Arc;

use crate::error::{PersistenceError, Result};
use crate::storage::StorageBackend;
use flowdeck_model::ChatEntry;

const CHAT_INDEX_KEY: &str = "flowdeck.chat.index";
const CHAT_RECORD_PREFIX: &str = "flowdeck.chat.entry.";

/// Immediate-write store for chat entries.
pub struct ChatStore {
    backend: Arc<dyn StorageBackend>,
}

impl ChatStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    fn record_key(id: &str) -> String {
        format!("{CHAT_RECORD_PREFIX}{id}")
    }

    /// Ids currently in the index, in insertion order.
    pub fn list_ids(&self) -> Vec<String> {
        let Some(payload) = self.backend.read(CHAT_INDEX_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str(&payload) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "chat index unreadable; treating as empty");
                Vec::new()
            }
        }
    }

    /// Write an entry and make sure the index lists it.
    pub fn save_entry(&self, entry: &ChatEntry) -> Result<()> {
        let payload =
            serde_json::to_string(entry).map_err(PersistenceError::serialize_fault)?;
        let key = Self::record_key(&entry.id);
        self.backend
            .write(&key, &payload)
            .map_err(|e| PersistenceError::from_storage(&key, e))?;

        let mut ids = self.list_ids();
        if !ids.iter().any(|id| id == &entry.id) {
            ids.push(entry.id.clone());
            self.write_index(&ids)?;
        }
        Ok(())
    }

    /// Load an entry, honoring index ownership: an id missing from the
    /// index reads as absent even if a stale record remains.
    pub fn load_entry(&self, id: &str) -> Option<ChatEntry> {
        if !self.list_ids().iter().any(|listed| listed == id) {
            return None;
        }
        let payload = self.backend.read(&Self::record_key(id))?;
        match serde_json::from_str(&payload) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(id, error = %e, "chat record unreadable");
                None
            }
        }
    }

    /// Load every indexed entry, skipping unreadable records.
    pub fn list_entries(&self) -> Vec<ChatEntry> {
        self.list_ids()
            .iter()
            .filter_map(|id| self.load_entry(id))
            .collect()
    }

    /// Delist an id, then remove its record.
    pub fn delete_entry(&self, id: &str) -> Result<()> {
        let mut ids = self.list_ids();
        ids.retain(|listed| listed != id);
        self.write_index(&ids)?;
        self.backend.remove(&Self::record_key(id));
        Ok(())
    }

    fn write_index(&self, ids: &[String]) -> Result<()> {
        let payload = serde_json::to_string(ids).map_err(PersistenceError::serialize_fault)?;
        self.backend
            .write(CHAT_INDEX_KEY, &payload)
            .map_err(|e| PersistenceError::from_storage(CHAT_INDEX_KEY, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use flowdeck_model::ChatRole;

    fn store() -> (ChatStore, Arc<MemoryStore>) {
        let backend = Arc::new(MemoryStore::new());
        (ChatStore::new(backend.clone()), backend)
    }

    #[test]
    fn test_save_and_load_entry() {
        let (chat, _) = store();

        let mut entry = ChatEntry::new("Debugging a pipeline");
        entry.push_message(ChatRole::User, "why does step 3 stall?");
        chat.save_entry(&entry).unwrap();

        let loaded = chat.load_entry(&entry.id).unwrap();
        assert_eq!(loaded, entry);
        assert_eq!(chat.list_ids(), vec![entry.id.clone()]);
    }

    #[test]
    fn test_resave_does_not_duplicate_index() {
        let (chat, _) = store();

        let entry = ChatEntry::new("One");
        chat.save_entry(&entry).unwrap();
        chat.save_entry(&entry).unwrap();

        assert_eq!(chat.list_ids().len(), 1);
    }

    #[test]
    fn test_stale_record_is_invisible() {
        let (chat, backend) = store();

        let entry = ChatEntry::new("Ghost");
        chat.save_entry(&entry).unwrap();

        // Simulate a delete where only the index write landed
        backend
            .write(super::CHAT_INDEX_KEY, "[]")
            .unwrap();

        assert!(backend.read(&ChatStore::record_key(&entry.id)).is_some());
        assert!(chat.load_entry(&entry.id).is_none());
        assert!(chat.list_entries().is_empty());
    }

    #[test]
    fn test_delete_entry() {
        let (chat, backend) = store();

        let first = ChatEntry::new("Keep");
        let second = ChatEntry::new("Drop");
        chat.save_entry(&first).unwrap();
        chat.save_entry(&second).unwrap();

        chat.delete_entry(&second.id).unwrap();

        assert_eq!(chat.list_ids(), vec![first.id.clone()]);
        assert!(backend.read(&ChatStore::record_key(&second.id)).is_none());
    }

    #[test]
    fn test_quota_failure_is_distinct() {
        let backend = Arc::new(MemoryStore::with_capacity(8));
        let chat = ChatStore::new(backend);

        let entry = ChatEntry::new("Too big for the store");
        let result = chat.save_entry(&entry);
        assert!(matches!(result, Err(PersistenceError::Quota { .. })));
    }
}
