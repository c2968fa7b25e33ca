//! editmerge core library.
//!
//! This crate provides the building blocks for resolving concurrent edits of
//! a text page: a line-based three-way merge engine, the edit/save session
//! state machine that decides when a merge is needed, configuration, and the
//! revision store capability the resolver reads from.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod models;
pub mod store;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::{ConflictResolver, ConflictSession, MergeEngine, MergeOutcome};
pub use models::{Action, EditRequest, SessionState, Timestamp};
pub use store::{MemoryRevisionStore, RevisionStore};
