//! Revision store capability.
//!
//! The conflict machinery never persists anything itself; it only reads page
//! revisions through [`RevisionStore`]. [`MemoryRevisionStore`] is a simple
//! in-memory implementation used by the CLI and the tests.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::errors::StoreError;
use crate::models::Timestamp;

/// Read access to the revisions of a page.
pub trait RevisionStore {
    /// Text of the revision saved at `timestamp`. `0` means the latest
    /// revision; a page with no revisions reads as empty text.
    fn text_at(&self, page_id: &str, timestamp: Timestamp) -> Result<String, StoreError>;

    /// Timestamp of the latest revision, or `0` if the page has none.
    fn latest_revision_timestamp(&self, page_id: &str) -> Result<Timestamp, StoreError>;
}

/// In-memory revision store keyed by page id and timestamp.
#[derive(Debug, Clone, Default)]
pub struct MemoryRevisionStore {
    pages: HashMap<String, BTreeMap<Timestamp, String>>,
}

impl MemoryRevisionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a revision. Saving twice at the same timestamp replaces the
    /// earlier text.
    pub fn save(&mut self, page_id: &str, timestamp: Timestamp, text: impl Into<String>) {
        debug!(page_id, timestamp, "storing revision");
        self.pages
            .entry(page_id.to_string())
            .or_default()
            .insert(timestamp, text.into());
    }

    /// Number of revisions stored for `page_id`.
    pub fn revision_count(&self, page_id: &str) -> usize {
        self.pages.get(page_id).map_or(0, BTreeMap::len)
    }
}

impl RevisionStore for MemoryRevisionStore {
    fn text_at(&self, page_id: &str, timestamp: Timestamp) -> Result<String, StoreError> {
        let Some(revisions) = self.pages.get(page_id) else {
            if timestamp == 0 {
                return Ok(String::new());
            }
            return Err(StoreError::PageNotFound(page_id.to_string()));
        };

        let text = if timestamp == 0 {
            revisions.values().next_back()
        } else {
            revisions.get(&timestamp)
        };

        text.cloned().ok_or_else(|| StoreError::RevisionNotFound {
            page_id: page_id.to_string(),
            timestamp,
        })
    }

    fn latest_revision_timestamp(&self, page_id: &str) -> Result<Timestamp, StoreError> {
        Ok(self
            .pages
            .get(page_id)
            .and_then(|revisions| revisions.keys().next_back().copied())
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_page() {
        let store = MemoryRevisionStore::new();
        assert_eq!(store.latest_revision_timestamp("missing").unwrap(), 0);
        assert_eq!(store.text_at("missing", 0).unwrap(), "");
        assert!(matches!(
            store.text_at("missing", 7),
            Err(StoreError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_latest_and_specific_revisions() {
        let mut store = MemoryRevisionStore::new();
        store.save("start", 100, "first");
        store.save("start", 150, "second");

        assert_eq!(store.latest_revision_timestamp("start").unwrap(), 150);
        assert_eq!(store.text_at("start", 0).unwrap(), "second");
        assert_eq!(store.text_at("start", 100).unwrap(), "first");
        assert_eq!(store.revision_count("start"), 2);
        assert!(matches!(
            store.text_at("start", 120),
            Err(StoreError::RevisionNotFound { timestamp: 120, .. })
        ));
    }
}
