//! Durable workspace-state persistence for FlowDeck Studio.
//!
//! This crate saves and restores a single large, frequently-mutated
//! workspace state to a bounded local key-value store, and to/from
//! externally exchanged files, without blocking interactive code.
//!
//! # Architecture
//!
//! - `storage/` - synchronous key-value backends (memory, file-per-key)
//! - `worker/` - serialization worker, its message protocol, and the
//!   inline-vs-worker dispatcher with request correlation and timeouts
//! - `autosave/` - debounced save scheduling with an explicit flush
//! - `engine.rs` - the composition root: save/load/clear/import/export
//! - `exchange.rs` - host file/remote collaborator boundary
//! - `event.rs` - save/clear notification bus
//! - `chat.rs` - independent, immediate-write chat history lane
//! - `error.rs` - failure taxonomy with user-facing remediation
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use flowdeck_persistence::{
//!     FileStore, HostExchange, PersistenceConfig, PersistenceEngine,
//! };
//!
//! let backend = Arc::new(FileStore::new("/data/flowdeck"));
//! let exchange = Arc::new(HostExchange::new("/exports", "https://assets.flowdeck.dev"));
//! let engine = PersistenceEngine::new(backend, exchange, PersistenceConfig::default());
//!
//! engine.save_state(workspace);          // debounced, non-blocking
//! let restored = engine.load_state();    // synchronous
//! engine.flush_pending_save();           // teardown escape hatch
//! ```
//!
//! # Failure semantics
//!
//! Debounced saves are fire-and-forget: outcomes surface on the event bus,
//! never to the `save_state` caller. Import/export/load/clear are explicit
//! user actions and fail loudly. Quota exhaustion and shape-validation
//! failures carry distinct codes because their remediation differs.

mod autosave;
mod chat;
mod config;
mod engine;
mod error;
mod event;
mod exchange;
mod storage;
mod worker;

pub use chat::ChatStore;
pub use config::{DEFAULT_STATE_RESOURCE, PersistenceConfig};
pub use engine::{DEFAULT_ARCHIVE_FILENAME, DEFAULT_EXPORT_FILENAME, PersistenceEngine};
pub use error::{ErrorCode, FailureReport, PersistenceError, Result};
pub use event::{EventBus, PersistenceEvent};
pub use exchange::{Exchange, HostExchange};
pub use storage::{FileStore, MemoryStore, StorageBackend, StorageError};
pub use worker::{DispatchStats, SerializationDispatcher};
