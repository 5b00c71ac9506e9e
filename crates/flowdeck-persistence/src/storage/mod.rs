//! Bounded local key-value storage.
//!
//! This module handles:
//! - The synchronous [`StorageBackend`] primitive the engine writes through
//! - An in-memory implementation for tests and ephemeral sessions
//! - A file-per-key implementation with atomic writes and quota accounting

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use thiserror::Error;

/// Failure modes of a storage write.
///
/// Quota exhaustion is kept distinct because callers surface it
/// differently from any other fault.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store's capacity would be exceeded by this write.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// Any other fault.
    #[error("storage fault: {0}")]
    Other(String),
}

/// Synchronous key-value read-write-delete-clear primitive.
///
/// `read` of a missing or unreadable key returns `None` rather than an
/// error: at this layer corruption is indistinguishable from absence, and
/// higher layers decide whether that is fatal.
pub trait StorageBackend: Send + Sync {
    /// Write a value under a key, replacing any previous value.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Read the value under a key, or `None` if absent or unreadable.
    fn read(&self, key: &str) -> Option<String>;

    /// Remove a key. Removing an absent key is a no-op.
    fn remove(&self, key: &str);

    /// Remove every key in the store.
    fn clear(&self);
}
