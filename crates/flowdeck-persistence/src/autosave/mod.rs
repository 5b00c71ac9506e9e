//! Debounced save scheduling.
//!
//! Provides:
//! - `DebouncedSaveScheduler` - coalesces save bursts into one trailing commit
//! - `CommitRequest` - what the scheduler hands to the engine's commit loop

mod scheduler;

pub use scheduler::DebouncedSaveScheduler;
pub(crate) use scheduler::CommitRequest;
