//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Well-known remote resource used by the save-as-default / load-default
/// lane.
pub const DEFAULT_STATE_RESOURCE: &str = "default-workspace.json";

/// Configuration for the persistence engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Storage key the workspace state is persisted under.
    ///
    /// Exclusively owned by the engine; nothing else writes this key.
    pub storage_key: String,

    /// Debounce delay in milliseconds.
    ///
    /// After a save request, the engine waits this long before committing.
    /// Additional requests reset the timer and replace the buffered state.
    pub debounce_ms: u64,

    /// Estimated payload size above which serialization is offloaded to
    /// the worker instead of running inline.
    pub large_payload_threshold: usize,

    /// Hard bound on a single worker round trip, in milliseconds.
    pub worker_timeout_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            storage_key: "flowdeck.workspace".to_string(),
            debounce_ms: 500,
            large_payload_threshold: 256 * 1024, // 256 KiB
            worker_timeout_ms: 30_000,
        }
    }
}

impl PersistenceConfig {
    /// Debounce delay as a [`Duration`].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Worker timeout as a [`Duration`].
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }
}
