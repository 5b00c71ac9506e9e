//! Persistence engine: the composition root.
//!
//! Owns the storage backend, the serialization dispatcher, and the
//! debounced save scheduler, and exposes the save/load/clear/import/
//! export surface the rest of the application uses.
//!
//! # Save path
//!
//! ```text
//! save_state(state) --> scheduler (buffers, last write wins)
//!   --> timer fires --> commit loop --> dispatcher (inline or worker)
//!   --> storage write --> SaveCompleted / SaveFailed event
//! ```
//!
//! `save_state` never blocks and never reports failure to its caller;
//! outcomes arrive on the event bus. Load is synchronous and bypasses the
//! dispatcher. Import/export go through the exchange collaborator and
//! fail loudly to their immediate caller.
//!
//! # Caller discipline
//!
//! The state is captured at `save_state` time: it is moved into the
//! scheduler by value, so the caller cannot mutate it while a commit is
//! outstanding. What gets committed is exactly what was passed in.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::autosave::{CommitRequest, DebouncedSaveScheduler};
use crate::config::{DEFAULT_STATE_RESOURCE, PersistenceConfig};
use crate::error::{FailureReport, PersistenceError, Result};
use crate::event::{EventBus, PersistenceEvent};
use crate::exchange::Exchange;
use crate::storage::StorageBackend;
use crate::worker::{DispatchStats, SerializationDispatcher, gunzip_base64};
use flowdeck_model::{StateDocument, WorkspaceState};

/// Filename used when an export caller does not pick one.
pub const DEFAULT_EXPORT_FILENAME: &str = "flowdeck-workspace.json";

/// Filename used for compressed archive exports.
pub const DEFAULT_ARCHIVE_FILENAME: &str = "flowdeck-workspace.fdz";

/// Durable persistence for one workspace state.
///
/// Owns the single storage key it writes; nothing else may touch that key.
/// Multiple engines over distinct keys/backends are independent — there is
/// no process-wide state.
pub struct PersistenceEngine {
    backend: Arc<dyn StorageBackend>,
    exchange: Arc<dyn Exchange>,
    dispatcher: Arc<SerializationDispatcher>,
    scheduler: DebouncedSaveScheduler,
    events: EventBus,
    epoch: Arc<AtomicU64>,
    config: PersistenceConfig,
}

impl PersistenceEngine {
    /// Build an engine and spawn its commit loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        exchange: Arc<dyn Exchange>,
        config: PersistenceConfig,
    ) -> Self {
        let events = EventBus::new();
        let epoch = Arc::new(AtomicU64::new(0));
        let dispatcher = Arc::new(SerializationDispatcher::new(&config));

        let (commit_tx, commit_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_commit_loop(
            commit_rx,
            Arc::clone(&backend),
            Arc::clone(&dispatcher),
            events.clone(),
            Arc::clone(&epoch),
            config.storage_key.clone(),
        ));

        let scheduler =
            DebouncedSaveScheduler::new(config.debounce(), commit_tx, Arc::clone(&epoch));

        Self {
            backend,
            exchange,
            dispatcher,
            scheduler,
            events,
            epoch,
            config,
        }
    }

    /// Request a debounced save of `state`.
    ///
    /// Non-blocking and fire-and-forget: the commit runs later, and its
    /// outcome is observable only on the event bus.
    pub fn save_state(&self, state: impl Into<StateDocument>) {
        self.scheduler.schedule(state.into());
    }

    /// Commit a buffered save immediately, if any. Idempotent.
    ///
    /// Returns before the commit itself finishes; callers needing a hard
    /// durability guarantee await the matching `SaveCompleted` event.
    /// Intended for teardown, before the host environment goes away.
    pub fn flush_pending_save(&self) {
        self.scheduler.flush();
    }

    /// Whether a save is buffered and waiting for its timer.
    pub fn is_save_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Subscribe to save/clear notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PersistenceEvent> {
        self.events.subscribe()
    }

    /// How many serialization jobs ran inline vs. on the worker.
    pub fn serialization_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Load the persisted workspace state.
    ///
    /// Returns `None` when nothing is persisted or the record is
    /// unreadable — an absent state is a legitimate cold start, never an
    /// error to the caller. Legacy documents are migrated on the way out.
    pub fn load_state(&self) -> Option<WorkspaceState> {
        let payload = self.backend.read(&self.config.storage_key)?;
        match StateDocument::from_json_str(&payload) {
            Ok(document) => {
                if document.is_legacy() {
                    tracing::info!("persisted workspace uses legacy schema; migrating");
                }
                tracing::info!(bytes = payload.len(), "workspace state loaded");
                Some(document.into_current())
            }
            Err(e) => {
                tracing::warn!(error = %e, "persisted workspace unreadable; starting cold");
                None
            }
        }
    }

    /// Remove the persisted workspace record.
    ///
    /// Also cancels any buffered save and invalidates commits already in
    /// flight, so a pre-clear save cannot resurrect the cleared state.
    pub fn clear_state(&self) {
        self.scheduler.cancel();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.backend.remove(&self.config.storage_key);
        self.events.emit(PersistenceEvent::StateCleared);
        tracing::info!("workspace state cleared");
    }

    /// Export a state to a pretty-printed workspace file.
    ///
    /// Validates the document shape first; a state with neither a
    /// `projects` nor a `pages` sequence is rejected, never coerced.
    /// Returns the filename written.
    pub async fn export_to_file(
        &self,
        state: &Value,
        filename: Option<&str>,
    ) -> Result<String> {
        let document = StateDocument::from_value(state.clone())?;
        let payload = serde_json::to_string_pretty(&document)
            .map_err(PersistenceError::serialize_fault)?;

        let name = filename.unwrap_or(DEFAULT_EXPORT_FILENAME);
        self.exchange.write_file(Path::new(name), &payload).await?;
        tracing::info!(file = name, bytes = payload.len(), "workspace exported");
        Ok(name.to_string())
    }

    /// Import a workspace file, validating and migrating it.
    ///
    /// Never touches the persisted record: the caller decides whether the
    /// imported state becomes current (and saves it explicitly).
    pub async fn import_from_file(&self, path: &Path) -> Result<WorkspaceState> {
        let payload = self.exchange.read_file(path).await?;
        let document = self.parse_document(payload).await?;
        if document.is_legacy() {
            tracing::info!(path = %path.display(), "imported legacy workspace; migrating");
        }
        Ok(document.into_current())
    }

    /// Publish a state as the well-known default workspace.
    pub async fn save_as_default(&self, state: &Value) -> Result<()> {
        let document = StateDocument::from_value(state.clone())?;
        let payload = serde_json::to_string_pretty(&document)
            .map_err(PersistenceError::serialize_fault)?;
        self.exchange
            .post_file(DEFAULT_STATE_RESOURCE, &payload)
            .await?;
        tracing::info!("workspace published as default");
        Ok(())
    }

    /// Fetch and validate the well-known default workspace.
    pub async fn load_default_state(&self) -> Result<WorkspaceState> {
        let payload = self.exchange.fetch_file(DEFAULT_STATE_RESOURCE).await?;
        let document = self.parse_document(payload).await?;
        Ok(document.into_current())
    }

    /// Export a state as a compressed archive (base64-encoded gzip).
    pub async fn export_archive(
        &self,
        state: &Value,
        filename: Option<&str>,
    ) -> Result<String> {
        let document = StateDocument::from_value(state.clone())?;
        let payload =
            serde_json::to_string(&document).map_err(PersistenceError::serialize_fault)?;
        let archived = self.dispatcher.compress(payload).await?;

        let name = filename.unwrap_or(DEFAULT_ARCHIVE_FILENAME);
        self.exchange.write_file(Path::new(name), &archived).await?;
        tracing::info!(file = name, "workspace archive exported");
        Ok(name.to_string())
    }

    /// Import a compressed archive produced by [`Self::export_archive`].
    pub async fn import_archive(&self, path: &Path) -> Result<WorkspaceState> {
        let archived = self.exchange.read_file(path).await?;
        let payload = gunzip_base64(&archived).map_err(PersistenceError::parse_fault)?;
        let document = self.parse_document(payload).await?;
        Ok(document.into_current())
    }

    /// Parse wire text into a validated document, offloading large
    /// payloads to the worker.
    async fn parse_document(&self, payload: String) -> Result<StateDocument> {
        let value = self.dispatcher.parse(payload).await?;
        Ok(StateDocument::from_value(value)?)
    }
}

/// Drain commit requests: serialize, write, announce.
///
/// Runs until the scheduler (and with it the engine) is dropped. Failures
/// are recovered locally into events; the loop itself never stops on one.
async fn run_commit_loop(
    mut commits: mpsc::UnboundedReceiver<CommitRequest>,
    backend: Arc<dyn StorageBackend>,
    dispatcher: Arc<SerializationDispatcher>,
    events: EventBus,
    epoch: Arc<AtomicU64>,
    storage_key: String,
) {
    while let Some(request) = commits.recv().await {
        if request.epoch < epoch.load(Ordering::SeqCst) {
            tracing::debug!("dropping commit scheduled before clear");
            continue;
        }

        let payload = match dispatcher.serialize(request.state).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize workspace state");
                events.emit(PersistenceEvent::SaveFailed(FailureReport::from_error(&e)));
                continue;
            }
        };

        // The state was cleared while serialization was in flight.
        if request.epoch < epoch.load(Ordering::SeqCst) {
            tracing::debug!("dropping commit cleared during serialization");
            continue;
        }

        let bytes = payload.len();
        let write_backend = Arc::clone(&backend);
        let write_key = storage_key.clone();
        let written = tokio::task::spawn_blocking(move || {
            write_backend.write(&write_key, &payload)
        })
        .await;

        match written {
            Ok(Ok(())) => {
                tracing::info!(bytes, "workspace state saved");
                events.emit(PersistenceEvent::SaveCompleted { bytes });
            }
            Ok(Err(storage_error)) => {
                let e = PersistenceError::from_storage(&storage_key, storage_error);
                tracing::error!(error = %e, "failed to write workspace state");
                events.emit(PersistenceEvent::SaveFailed(FailureReport::from_error(&e)));
            }
            Err(join_error) => {
                let e = PersistenceError::Unknown {
                    message: format!("storage write task failed: {join_error}"),
                };
                tracing::error!(error = %e, "storage write task failed");
                events.emit(PersistenceEvent::SaveFailed(FailureReport::from_error(&e)));
            }
        }
    }
}
