//! File-per-key storage backend.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{StorageBackend, StorageError};

/// Directory-backed store: one file per key, with an optional byte
/// capacity across the whole directory.
///
/// Writes go through a temp file and rename so a crash mid-write can
/// never leave a half-written record behind.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    capacity_bytes: Option<usize>,
}

impl FileStore {
    /// Create an unbounded store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            capacity_bytes: None,
        }
    }

    /// Create a store that rejects writes once the directory would exceed
    /// `capacity_bytes`.
    pub fn with_capacity(dir: impl Into<PathBuf>, capacity_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity_bytes: Some(capacity_bytes),
        }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }

    fn used_bytes(&self, excluding: &Path) -> std::io::Result<u64> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut total = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path() == excluding {
                continue;
            }
            total += entry.metadata()?.len();
        }
        Ok(total)
    }
}

/// Map a storage key to a safe file stem.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

impl StorageBackend for FileStore {
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.key_path(key);

        fs::create_dir_all(&self.dir)
            .map_err(|e| StorageError::Other(format!("create store directory: {e}")))?;

        if let Some(capacity) = self.capacity_bytes {
            let used = self
                .used_bytes(&path)
                .map_err(|e| StorageError::Other(format!("measure store usage: {e}")))?;
            if used + value.len() as u64 > capacity as u64 {
                return Err(StorageError::QuotaExceeded);
            }
        }

        let temp_path = path.with_extension("json.tmp");
        let write_result = (|| -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
            fs::rename(&temp_path, &path)
        })();

        write_result.map_err(|e| match e.kind() {
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => StorageError::QuotaExceeded,
            _ => StorageError::Other(format!("write '{key}': {e}")),
        })
    }

    fn read(&self, key: &str) -> Option<String> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                // Unreadable records are treated as absent at this layer.
                tracing::warn!(key, error = %e, "unreadable record treated as absent");
                None
            }
        }
    }

    fn remove(&self, key: &str) {
        let path = self.key_path(key);
        if let Err(e) = fs::remove_file(&path)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(key, error = %e, "failed to remove record");
        }
    }

    fn clear(&self) {
        if !self.dir.exists() {
            return;
        }
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list store directory for clear");
                return;
            }
        };
        for entry in entries.flatten() {
            if let Err(e) = fs::remove_file(entry.path()) {
                tracing::warn!(path = %entry.path().display(), error = %e, "failed to clear record");
            }
        }
    }
}
