//! Edit/save request handling.
//!
//! The [`ConflictResolver`] runs a request through the session state
//! machine, and when the page moved on while the editor was working, reads
//! the base and latest revisions from the [`RevisionStore`], merges, and
//! builds the conflict-solving response.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::merger::{MergeEngine, OutcomeKind};
use super::session::{ConflictSession, PresentedState};
use crate::errors::StoreError;
use crate::models::{Action, EditRequest, SessionState, Timestamp};
use crate::store::RevisionStore;

/// Everything the response layer needs to render a conflict-solving page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPage {
    /// Buffer, base and acknowledgment to embed in the form.
    pub presented: PresentedState,
    /// Latest revision the buffer was merged with.
    pub latest_revision: Timestamp,
    /// Edit summary, carried through unchanged.
    pub summary: String,
    /// Unified diff from the latest revision to the presented buffer.
    pub diff: String,
}

impl ConflictPage {
    pub fn outcome(&self) -> OutcomeKind {
        self.presented.outcome
    }

    /// Short user-facing notice for the outcome.
    pub fn notice(&self) -> &'static str {
        match self.presented.outcome {
            OutcomeKind::Clean => {
                "The page was changed while you were editing it. Your changes could be merged automatically; review them and save again."
            }
            OutcomeKind::Conflicting => {
                "The page was changed while you were editing it and your changes couldn't be merged automatically. Resolve the marked conflicts and save again."
            }
            OutcomeKind::Failed => {
                "The page was changed while you were editing it. Your text is shown unmerged; compare it with the current version before saving."
            }
        }
    }
}

/// Result of handling one edit or save request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum Response {
    /// Continue with the ordinary edit or save flow using `state`.
    Proceed {
        action: Action,
        state: SessionState,
        summary: String,
    },
    /// Show the conflict-solving page.
    ConflictSolving(ConflictPage),
}

impl Response {
    /// State to round-trip with the next request.
    pub fn state(&self) -> &SessionState {
        match self {
            Self::Proceed { state, .. } => state,
            Self::ConflictSolving(page) => &page.presented.state,
        }
    }

    pub fn is_conflict_solving(&self) -> bool {
        matches!(self, Self::ConflictSolving(_))
    }
}

/// Handles edit/save requests against a revision store.
pub struct ConflictResolver<S> {
    store: S,
    engine: MergeEngine,
}

impl<S: RevisionStore> ConflictResolver<S> {
    pub fn new(store: S, engine: MergeEngine) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn engine(&self) -> &MergeEngine {
        &self.engine
    }

    /// Handle one request.
    ///
    /// An edit that proceeds normally drops the acknowledgment: the edit form
    /// only round-trips the base revision, so the following save is checked
    /// against that base again.
    ///
    /// A request without a base revision (missing or malformed date) is never
    /// merged: timestamp 0 would read the latest revision as the base and
    /// report a clean merge that never happened.
    #[instrument(skip(self, request), fields(page_id = %request.page_id, action = %request.action))]
    pub fn handle(&self, request: &EditRequest) -> Result<Response, StoreError> {
        let latest = self.store.latest_revision_timestamp(&request.page_id)?;
        let prior = request.session_state();

        let decision =
            ConflictSession::transition(request.action, request.conflict_date, &prior, latest);

        if !decision.needs_merge() {
            return Ok(Self::proceed(request, decision.next_state(&prior)));
        }
        if prior.base_timestamp == 0 {
            warn!(latest, "request carries no base revision, skipping merge");
            return Ok(Self::proceed(request, prior));
        }

        let old = self.store.text_at(&request.page_id, prior.base_timestamp)?;
        let yours = self.store.text_at(&request.page_id, 0)?;

        let outcome = self.engine.merge(&old, &prior.buffer_text, &yours);
        let presented = ConflictSession::fold(&prior, latest, outcome);
        let diff = diffy::create_patch(&yours, &presented.state.buffer_text).to_string();

        info!(
            outcome = %presented.outcome,
            base = presented.state.base_timestamp,
            ack = presented.state.acknowledged_conflict_timestamp,
            "conflict solving page prepared"
        );

        Ok(Response::ConflictSolving(ConflictPage {
            presented,
            latest_revision: latest,
            summary: request.summary.clone(),
            diff,
        }))
    }

    fn proceed(request: &EditRequest, mut state: SessionState) -> Response {
        if request.action == Action::Edit {
            state.acknowledged_conflict_timestamp = 0;
        }
        Response::Proceed {
            action: request.action,
            state,
            summary: request.summary.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::diff3::Diff3Merger;
    use crate::store::MemoryRevisionStore;

    const ORIGINAL: &str = "First line\n\nSecond line\n\nThird line";

    fn resolver() -> ConflictResolver<MemoryRevisionStore> {
        let mut store = MemoryRevisionStore::new();
        store.save("start", 100, ORIGINAL);
        ConflictResolver::new(store, MergeEngine::builtin())
    }

    fn request(action: Action, date: Timestamp, conflict_date: Timestamp, text: &str) -> EditRequest {
        EditRequest {
            page_id: "start".into(),
            action,
            date,
            conflict_date,
            text: text.into(),
            summary: "fix".into(),
        }
    }

    #[test]
    fn test_save_without_concurrent_change_proceeds() {
        let resolver = resolver();
        let response = resolver
            .handle(&request(Action::Save, 100, 0, "Some text"))
            .unwrap();
        assert!(!response.is_conflict_solving());
        assert_eq!(response.state().buffer_text, "Some text");
        assert_eq!(response.state().base_timestamp, 100);
    }

    #[test]
    fn test_concurrent_save_is_merged() {
        let mut resolver = resolver();
        resolver
            .store_mut()
            .save("start", 200, "First line\n\nSecond line\n\nThird line modified by user 2");

        let response = resolver
            .handle(&request(
                Action::Save,
                100,
                0,
                "First line modified by user 1\n\nSecond line\n\nThird line",
            ))
            .unwrap();

        let Response::ConflictSolving(page) = response else {
            panic!("expected conflict solving page");
        };
        assert_eq!(page.outcome(), OutcomeKind::Clean);
        assert_eq!(
            page.presented.state.buffer_text,
            "First line modified by user 1\n\nSecond line\n\nThird line modified by user 2"
        );
        assert_eq!(page.presented.state.base_timestamp, 200);
        assert_eq!(page.latest_revision, 200);
        assert_eq!(page.summary, "fix");
        assert!(page.diff.contains("+First line modified by user 1"));
        assert!(page.notice().contains("merged automatically"));
    }

    #[test]
    fn test_failed_merge_presents_own_buffer() {
        let mut store = MemoryRevisionStore::new();
        store.save("start", 100, ORIGINAL);
        store.save("start", 200, "First line modified by user 2\n\nSecond line\n\nThird line");
        let engine = MergeEngine::new(Box::new(Diff3Merger::new("/nonexistent/diff3")));
        let resolver = ConflictResolver::new(store, engine);

        let mine = "First line\n\nSecond line\n\nThird line modified by user 1";
        let response = resolver.handle(&request(Action::Save, 100, 0, mine)).unwrap();

        let Response::ConflictSolving(page) = response else {
            panic!("expected conflict solving page");
        };
        assert_eq!(page.outcome(), OutcomeKind::Failed);
        assert_eq!(page.presented.state.buffer_text, mine);
        assert_eq!(page.presented.state.base_timestamp, 100);
        assert_eq!(page.presented.state.acknowledged_conflict_timestamp, 0);
    }

    #[test]
    fn test_edit_drops_acknowledgment() {
        let mut resolver = resolver();
        resolver.store_mut().save("start", 200, "changed");
        let response = resolver
            .handle(&request(Action::Edit, 100, 200, "buffer"))
            .unwrap();
        assert!(!response.is_conflict_solving());
        assert_eq!(response.state().base_timestamp, 100);
        assert_eq!(response.state().acknowledged_conflict_timestamp, 0);
    }

    #[test]
    fn test_malformed_date_is_not_merged() {
        let mut resolver = resolver();
        resolver.store_mut().save("start", 200, "changed by someone else\n");
        let request = EditRequest::from_params(
            "start",
            "save",
            "garbage",
            "",
            "my completely different text\n",
            "",
        )
        .unwrap();

        let response = resolver.handle(&request).unwrap();
        assert!(!response.is_conflict_solving());
        assert_eq!(response.state().base_timestamp, 0);
        assert_eq!(response.state().buffer_text, "my completely different text\n");
    }

    #[test]
    fn test_missing_base_revision_is_store_error() {
        let mut resolver = resolver();
        resolver.store_mut().save("start", 200, "changed");
        let result = resolver.handle(&request(Action::Save, 150, 0, "buffer"));
        assert!(matches!(result, Err(StoreError::RevisionNotFound { timestamp: 150, .. })));
    }
}
