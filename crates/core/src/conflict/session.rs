//! Edit-conflict session state machine.
//!
//! Decides, for every edit or save round-trip, whether the request can
//! proceed as usual or whether the editor's buffer has to be merged with the
//! latest revision first, and folds a merge outcome into the state presented
//! back to the editor.
//!
//! The scenario this guards against: editor A starts editing revision 100,
//! editor B saves revision 150, then A saves. A's save is intercepted, A's
//! buffer is merged against 100 -> 150 and the result is presented back.
//!
//! After a clean merge the base moves to the merged revision, so the next
//! save goes straight through. After a conflicting merge the base stays put
//! and the conflict revision is acknowledged instead: saving or editing
//! again without anyone else saving in between proceeds normally, while a
//! later save that no longer carries the acknowledgment is merged against
//! the original base again.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::merger::{MergeOutcome, OutcomeKind};
use crate::models::{Action, SessionState, Timestamp};

/// What the surrounding system should do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Handle the request as an ordinary edit or save. When `rebase_to` is
    /// set, the buffer was already reconciled against that revision and the
    /// session's base must move there before saving.
    ProceedNormally { rebase_to: Option<Timestamp> },
    /// Merge the buffer with the latest revision before going on.
    ResolveConflict,
}

impl Decision {
    pub fn needs_merge(&self) -> bool {
        matches!(self, Self::ResolveConflict)
    }

    /// The session state after applying this decision to `prior`.
    pub fn next_state(&self, prior: &SessionState) -> SessionState {
        let mut next = prior.clone();
        if let Self::ProceedNormally {
            rebase_to: Some(timestamp),
        } = self
        {
            next.base_timestamp = *timestamp;
        }
        next
    }
}

/// The state presented to the editor after a merge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentedState {
    /// Buffer, base and acknowledgment to round-trip with the next request.
    pub state: SessionState,
    /// Which merge outcome produced this state, for user messaging.
    pub outcome: OutcomeKind,
}

/// Stateless transition and fold functions.
pub struct ConflictSession;

impl ConflictSession {
    /// Decide how to handle `action` given the request's acknowledgment,
    /// the editor's state and the latest revision of the page.
    pub fn transition(
        action: Action,
        request_conflict_ack: Timestamp,
        prior: &SessionState,
        latest_revision_timestamp: Timestamp,
    ) -> Decision {
        let latest = latest_revision_timestamp;

        if latest == 0 || latest <= prior.base_timestamp {
            debug!(latest, base = prior.base_timestamp, "base is current");
            return Decision::ProceedNormally { rebase_to: None };
        }

        if request_conflict_ack == latest {
            debug!(%action, latest, "conflict already acknowledged");
            return match action {
                Action::Edit => Decision::ProceedNormally { rebase_to: None },
                Action::Save => Decision::ProceedNormally {
                    rebase_to: Some(request_conflict_ack),
                },
            };
        }

        info!(
            %action,
            page_id = %prior.page_id,
            base = prior.base_timestamp,
            latest,
            "page changed during edit, conflict resolution needed"
        );
        Decision::ResolveConflict
    }

    /// Fold a merge outcome into the state presented to the editor.
    pub fn fold(
        prior: &SessionState,
        latest_revision_timestamp: Timestamp,
        outcome: MergeOutcome,
    ) -> PresentedState {
        let kind = outcome.kind();
        let state = match outcome {
            MergeOutcome::Clean(text) => SessionState {
                page_id: prior.page_id.clone(),
                base_timestamp: latest_revision_timestamp,
                acknowledged_conflict_timestamp: 0,
                buffer_text: text,
            },
            MergeOutcome::Conflicting(text) => SessionState {
                page_id: prior.page_id.clone(),
                base_timestamp: prior.base_timestamp,
                acknowledged_conflict_timestamp: latest_revision_timestamp,
                buffer_text: text,
            },
            MergeOutcome::Failed => SessionState {
                acknowledged_conflict_timestamp: 0,
                ..prior.clone()
            },
        };

        debug!(
            outcome = %kind,
            base = state.base_timestamp,
            ack = state.acknowledged_conflict_timestamp,
            "merge outcome folded into session"
        );
        PresentedState {
            state,
            outcome: kind,
        }
    }
}
