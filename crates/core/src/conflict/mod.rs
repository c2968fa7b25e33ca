//! Three-way merging and edit-conflict resolution.
//!
//! The conflict subsystem is responsible for:
//! 1. **Diffing** -- computing line hunks between a base and a derivative.
//! 2. **Merging** -- combining two derivatives of one base, or reporting
//!    overlapping edits.
//! 3. **Sessions** -- deciding per edit/save round-trip when a merge is
//!    needed, and what the editor is shown afterwards.

pub mod diff3;
pub mod hunks;
pub mod merger;
pub mod resolver;
pub mod session;

pub use diff3::Diff3Merger;
pub use hunks::Hunk;
pub use merger::{ConflictLabels, LineMerger, MergeBackend, MergeEngine, MergeOutcome, OutcomeKind};
pub use resolver::{ConflictPage, ConflictResolver, Response};
pub use session::{ConflictSession, Decision, PresentedState};
