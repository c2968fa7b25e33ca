//! Domain model types shared by the session state machine, the resolver and
//! the CLI.
//!
//! Everything here is a plain value that travels with a request and its
//! response; nothing is stored between round-trips.

use serde::{Deserialize, Serialize};

/// A revision timestamp. `0` means "unset" (no revision, no acknowledgment).
pub type Timestamp = u64;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// The request kinds that can run into an edit conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Edit,
    Save,
}

impl Action {
    /// Clean a raw action name and map it to an [`Action`].
    ///
    /// The name is lowercased and every character outside `[1-9a-z_]` is
    /// dropped, so `"Save"` and `" save!"` are both a save. Returns `None`
    /// for any other action (preview, cancel, show, ...), which the conflict
    /// machinery never intercepts.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .to_lowercase()
            .chars()
            .filter(|c| matches!(c, '1'..='9' | 'a'..='z' | '_'))
            .collect();
        match cleaned.as_str() {
            "edit" => Some(Self::Edit),
            "save" => Some(Self::Save),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Edit => write!(f, "edit"),
            Self::Save => write!(f, "save"),
        }
    }
}

/// Parse a timestamp request parameter.
///
/// Empty, negative or otherwise malformed values become `0`, which reads as
/// "no acknowledgment" and errs toward re-running conflict detection.
pub fn parse_timestamp(raw: &str) -> Timestamp {
    raw.trim().parse::<Timestamp>().unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Per edit attempt state, reconstructed from every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    /// Page being edited.
    pub page_id: String,
    /// Revision the buffer is derived from.
    pub base_timestamp: Timestamp,
    /// Revision the editor was already shown a conflict for, or `0`.
    pub acknowledged_conflict_timestamp: Timestamp,
    /// Text currently being edited.
    pub buffer_text: String,
}

impl SessionState {
    /// Fresh state for an edit that starts at `base_timestamp`.
    pub fn new(
        page_id: impl Into<String>,
        base_timestamp: Timestamp,
        buffer_text: impl Into<String>,
    ) -> Self {
        Self {
            page_id: page_id.into(),
            base_timestamp,
            acknowledged_conflict_timestamp: 0,
            buffer_text: buffer_text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Edit request
// ---------------------------------------------------------------------------

/// An edit or save request as handed over by the request-routing layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditRequest {
    pub page_id: String,
    pub action: Action,
    /// Base revision the editor last synced to (the `date` parameter).
    pub date: Timestamp,
    /// Acknowledged conflict revision (the `conflictDate` parameter).
    pub conflict_date: Timestamp,
    /// The editor's buffer (the `wikitext` parameter).
    pub text: String,
    /// Edit summary, carried through unchanged.
    pub summary: String,
}

impl EditRequest {
    /// Build a request from raw string parameters.
    ///
    /// Returns `None` when the action is neither edit nor save. Timestamps
    /// go through [`parse_timestamp`].
    pub fn from_params(
        page_id: &str,
        action: &str,
        date: &str,
        conflict_date: &str,
        text: &str,
        summary: &str,
    ) -> Option<Self> {
        Some(Self {
            page_id: page_id.to_string(),
            action: Action::parse(action)?,
            date: parse_timestamp(date),
            conflict_date: parse_timestamp(conflict_date),
            text: text.to_string(),
            summary: summary.to_string(),
        })
    }

    /// The session state this request carries.
    pub fn session_state(&self) -> SessionState {
        SessionState {
            page_id: self.page_id.clone(),
            base_timestamp: self.date,
            acknowledged_conflict_timestamp: self.conflict_date,
            buffer_text: self.text.clone(),
        }
    }
}
