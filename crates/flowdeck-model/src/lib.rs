//! Persistence-facing state types for FlowDeck Studio.
//!
//! The engine treats the application state as opaque beyond one structural
//! fact: a current-format workspace keeps its content under a top-level
//! `projects` sequence, while legacy workspaces used `pages`. That fact is
//! decided exactly once, at the (de)serialization boundary, by
//! [`StateDocument`] — the rest of the codebase never probes field presence.
//!
//! The crate also carries the chat-history record types, which live in
//! their own persistence lane (saved immediately, never debounced).

mod chat;
mod state;

pub use chat::{ChatEntry, ChatMessage, ChatRole};
pub use state::{LegacyWorkspaceState, StateDocument, StateShapeError, WorkspaceState};
