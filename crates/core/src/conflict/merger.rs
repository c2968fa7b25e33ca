//! Three-way merge engine.
//!
//! [`MergeEngine`] compares a base text against two independently edited
//! derivatives ("mine" and "yours") and either combines them or reports
//! overlapping edits. The actual computation is delegated to a
//! [`MergeBackend`]: the in-process [`LineMerger`] by default, or the
//! external [`Diff3Merger`](super::diff3::Diff3Merger).

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::diff3::Diff3Merger;
use super::hunks::{apply_hunks, diff_hunks, split_lines, Hunk};
use crate::config::{AppConfig, MergeBackendKind};
use crate::errors::MergeError;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The result of a three-way merge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "text", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// No overlapping edits; the text contains both sides' changes.
    Clean(String),
    /// Overlapping edits; the text holds both candidates inside conflict
    /// blocks so it can be reconciled by hand.
    Conflicting(String),
    /// The merge could not be computed at all.
    Failed,
}

impl MergeOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Clean(_) => OutcomeKind::Clean,
            Self::Conflicting(_) => OutcomeKind::Conflicting,
            Self::Failed => OutcomeKind::Failed,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean(_))
    }

    pub fn is_conflicting(&self) -> bool {
        matches!(self, Self::Conflicting(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// The merged or best-effort text, if any was produced.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Clean(text) | Self::Conflicting(text) => Some(text),
            Self::Failed => None,
        }
    }
}

/// Payload-free tag of a [`MergeOutcome`], used in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Clean,
    Conflicting,
    Failed,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Conflicting => write!(f, "conflicting"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// Something that can compute a three-way merge.
///
/// Implementations report a conflict as `Ok(MergeOutcome::Conflicting(_))`
/// and reserve `Err` for the cases where no merge could be computed.
pub trait MergeBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn three_way(&self, base: &str, mine: &str, yours: &str) -> Result<MergeOutcome, MergeError>;
}

/// Labels written around conflict blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictLabels {
    pub mine: String,
    pub yours: String,
}

impl Default for ConflictLabels {
    fn default() -> Self {
        Self {
            mine: "mine".into(),
            yours: "yours".into(),
        }
    }
}

/// In-process line-based three-way merger.
#[derive(Debug, Clone, Default)]
pub struct LineMerger {
    labels: ConflictLabels,
}

impl LineMerger {
    pub fn new(labels: ConflictLabels) -> Self {
        Self { labels }
    }

    /// Merge `mine` and `yours` against `base`. Always produces text.
    pub fn merge_text(&self, base: &str, mine: &str, yours: &str) -> MergeOutcome {
        let base_lines = split_lines(base);
        let mine_lines = split_lines(mine);
        let yours_lines = split_lines(yours);

        let mine_hunks = diff_hunks(&base_lines, &mine_lines);
        let yours_hunks = diff_hunks(&base_lines, &yours_lines);
        let regions = group_regions(&mine_hunks, &yours_hunks);

        let mut out = String::with_capacity(base.len().max(mine.len()).max(yours.len()));
        let mut pos = 0;
        let mut conflicts = 0usize;

        for region in &regions {
            debug_assert!(region.range.start >= pos);
            push_lines(&mut out, &base_lines[pos..region.range.start]);

            let mine_side = apply_hunks(&base_lines, region.range.clone(), &region.mine);
            let yours_side = apply_hunks(&base_lines, region.range.clone(), &region.yours);

            if region.yours.is_empty() || mine_side == yours_side {
                push_lines(&mut out, &mine_side);
            } else if region.mine.is_empty() {
                push_lines(&mut out, &yours_side);
            } else {
                conflicts += 1;
                self.push_conflict(&mut out, &mine_side, &yours_side);
            }
            pos = region.range.end;
        }
        push_lines(&mut out, &base_lines[pos..]);

        debug!(
            mine_hunks = mine_hunks.len(),
            yours_hunks = yours_hunks.len(),
            regions = regions.len(),
            conflicts,
            "line merge complete"
        );

        if conflicts > 0 {
            MergeOutcome::Conflicting(out)
        } else {
            MergeOutcome::Clean(out)
        }
    }

    fn push_conflict(&self, out: &mut String, mine: &[&str], yours: &[&str]) {
        end_line(out);
        out.push_str("<<<<<<< ");
        out.push_str(&self.labels.mine);
        out.push('\n');
        push_lines(out, mine);
        end_line(out);
        out.push_str("=======\n");
        push_lines(out, yours);
        end_line(out);
        out.push_str(">>>>>>> ");
        out.push_str(&self.labels.yours);
        out.push('\n');
    }
}

impl MergeBackend for LineMerger {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn three_way(&self, base: &str, mine: &str, yours: &str) -> Result<MergeOutcome, MergeError> {
        Ok(self.merge_text(base, mine, yours))
    }
}

/// A run of base lines touched by a connected group of overlapping hunks.
struct Region<'h, 'a> {
    range: Range<usize>,
    mine: Vec<&'h Hunk<'a>>,
    yours: Vec<&'h Hunk<'a>>,
}

/// Group hunks into regions: hunks from different sides that overlap (even
/// transitively) share a region, every other hunk gets its own. Regions are
/// returned in base order.
fn group_regions<'h, 'a>(mine: &'h [Hunk<'a>], yours: &'h [Hunk<'a>]) -> Vec<Region<'h, 'a>> {
    let offset = mine.len();
    let mut parent: Vec<usize> = (0..mine.len() + yours.len()).collect();

    for (i, a) in mine.iter().enumerate() {
        for (j, b) in yours.iter().enumerate() {
            if a.overlaps(b) {
                let (ra, rb) = (find(&mut parent, i), find(&mut parent, offset + j));
                parent[ra.max(rb)] = ra.min(rb);
            }
        }
    }

    let mut groups: BTreeMap<usize, Region<'h, 'a>> = BTreeMap::new();
    let tagged = mine
        .iter()
        .map(|h| (true, h))
        .chain(yours.iter().map(|h| (false, h)));
    for (index, (is_mine, hunk)) in tagged.enumerate() {
        let root = find(&mut parent, index);
        let region = groups.entry(root).or_insert_with(|| Region {
            range: hunk.base_range.clone(),
            mine: Vec::new(),
            yours: Vec::new(),
        });
        region.range.start = region.range.start.min(hunk.base_range.start);
        region.range.end = region.range.end.max(hunk.base_range.end);
        if is_mine {
            region.mine.push(hunk);
        } else {
            region.yours.push(hunk);
        }
    }

    let mut regions: Vec<Region<'h, 'a>> = groups.into_values().collect();
    regions.sort_by_key(|r| (r.range.start, r.range.end));
    regions
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn push_lines(out: &mut String, lines: &[&str]) {
    for line in lines {
        out.push_str(line);
    }
}

fn end_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stateless three-way merge engine.
///
/// Safe to share between threads; every call works on its own inputs only.
pub struct MergeEngine {
    backend: Box<dyn MergeBackend>,
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeEngine")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl MergeEngine {
    pub fn new(backend: Box<dyn MergeBackend>) -> Self {
        Self { backend }
    }

    /// Engine backed by the in-process [`LineMerger`] with default labels.
    pub fn builtin() -> Self {
        Self::new(Box::new(LineMerger::default()))
    }

    /// Build the engine selected by `[merge] backend`.
    pub fn from_config(config: &AppConfig) -> Self {
        let labels = ConflictLabels {
            mine: config.merge.mine_label.clone(),
            yours: config.merge.yours_label.clone(),
        };
        match config.merge.backend {
            MergeBackendKind::Builtin => Self::new(Box::new(LineMerger::new(labels))),
            MergeBackendKind::Diff3 => Self::new(Box::new(Diff3Merger::from_config(
                &config.diff3,
                labels,
            ))),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Attempt a three-way merge of `mine` and `yours` against `base`.
    ///
    /// Never fails: a backend error is logged and reported as
    /// [`MergeOutcome::Failed`].
    pub fn merge(&self, base: &str, mine: &str, yours: &str) -> MergeOutcome {
        info!(backend = self.backend.name(), "performing three-way merge");

        if mine == base {
            debug!("mine == base, yours wins cleanly");
            return MergeOutcome::Clean(yours.to_string());
        }
        if yours == base {
            debug!("yours == base, mine wins cleanly");
            return MergeOutcome::Clean(mine.to_string());
        }
        if mine == yours {
            debug!("mine == yours, identical changes");
            return MergeOutcome::Clean(mine.to_string());
        }

        match self.backend.three_way(base, mine, yours) {
            Ok(outcome) => {
                info!(outcome = %outcome.kind(), "merge finished");
                outcome
            }
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "merge could not be computed");
                MergeOutcome::Failed
            }
        }
    }

    /// Quick check: would these three versions merge without conflicts?
    pub fn can_auto_merge(&self, base: &str, mine: &str, yours: &str) -> bool {
        self.merge(base, mine, yours).is_clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THREE_PARAGRAPHS: &str = "First paragraph\n\nSecond paragraph\n\nThird paragraph";

    fn merge(base: &str, mine: &str, yours: &str) -> MergeOutcome {
        MergeEngine::builtin().merge(base, mine, yours)
    }

    #[test]
    fn test_identical_texts() {
        let base = "line1\nline2\nline3\n";
        assert_eq!(merge(base, base, base), MergeOutcome::Clean(base.to_string()));
    }

    #[test]
    fn test_only_mine_changed() {
        let base = "line1\nline2\nline3\n";
        let mine = "line1\nmodified\nline3\n";
        assert_eq!(merge(base, mine, base), MergeOutcome::Clean(mine.to_string()));
    }

    #[test]
    fn test_only_yours_changed() {
        let base = "line1\nline2\nline3\n";
        let yours = "line1\nline2\nmodified\n";
        assert_eq!(merge(base, base, yours), MergeOutcome::Clean(yours.to_string()));
    }

    #[test]
    fn test_disjoint_paragraphs_merge() {
        let mine = "First paragraph modified by user 1\n\nSecond paragraph\n\nThird paragraph";
        let yours = "First paragraph\n\nSecond paragraph modified by user 2\n\nThird paragraph";
        assert_eq!(
            merge(THREE_PARAGRAPHS, mine, yours),
            MergeOutcome::Clean(
                "First paragraph modified by user 1\n\nSecond paragraph modified by user 2\n\nThird paragraph"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_single_line_conflict() {
        let base = "A bunch of words in a single line";
        let mine = "A bunch of words edited by user 1 in a single line";
        let yours = "A bunch of words in a single line edited by user 2";
        let outcome = merge(base, mine, yours);
        assert!(outcome.is_conflicting());
        let text = outcome.text().unwrap();
        assert!(!text.is_empty());
        assert!(text.contains("edited by user 1"));
        assert!(text.contains("edited by user 2"));
    }

    #[test]
    fn test_same_paragraph_conflict() {
        let mine = "First paragraph modified by user 1\n\nSecond paragraph\n\nThird paragraph";
        let yours = "First paragraph modified by user 2\n\nSecond paragraph\n\nThird paragraph";
        let outcome = merge(THREE_PARAGRAPHS, mine, yours);
        assert_eq!(
            outcome,
            MergeOutcome::Conflicting(
                "<<<<<<< mine\n\
                 First paragraph modified by user 1\n\
                 =======\n\
                 First paragraph modified by user 2\n\
                 >>>>>>> yours\n\
                 \n\
                 Second paragraph\n\
                 \n\
                 Third paragraph"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_empty_base_one_side() {
        assert_eq!(merge("", "X", ""), MergeOutcome::Clean("X".to_string()));
    }

    #[test]
    fn test_empty_base_both_sides_disagree() {
        let outcome = merge("", "X\n", "Y\n");
        assert_eq!(
            outcome,
            MergeOutcome::Conflicting("<<<<<<< mine\nX\n=======\nY\n>>>>>>> yours\n".to_string())
        );
    }

    #[test]
    fn test_same_change_both_sides() {
        assert_eq!(merge("old\n", "new\n", "new\n"), MergeOutcome::Clean("new\n".to_string()));
    }

    #[test]
    fn test_same_hunk_with_other_changes() {
        // Both sides make the same change to line b; mine also changes d.
        let base = "a\nb\nc\nd\n";
        let mine = "a\nB\nc\nD\n";
        let yours = "a\nB\nc\nd\n";
        assert_eq!(merge(base, mine, yours), MergeOutcome::Clean(mine.to_string()));
    }

    #[test]
    fn test_touching_ranges_do_not_conflict() {
        let base = "a\nb\n";
        let mine = "A\nb\n";
        let yours = "a\nB\n";
        assert_eq!(merge(base, mine, yours), MergeOutcome::Clean("A\nB\n".to_string()));
    }

    #[test]
    fn test_insertions_at_same_point_conflict() {
        let base = "a\nb\n";
        let mine = "a\nmine\nb\n";
        let yours = "a\nyours\nb\n";
        let outcome = merge(base, mine, yours);
        assert_eq!(
            outcome,
            MergeOutcome::Conflicting(
                "a\n<<<<<<< mine\nmine\n=======\nyours\n>>>>>>> yours\nb\n".to_string()
            )
        );
    }

    #[test]
    fn test_insertion_before_changed_line() {
        let base = "a\nb\nc\n";
        let mine = "a\nnew\nb\nc\n";
        let yours = "a\nB\nc\n";
        assert_eq!(
            merge(base, mine, yours),
            MergeOutcome::Clean("a\nnew\nB\nc\n".to_string())
        );
    }

    #[test]
    fn test_transitive_overlap_forms_one_block() {
        let base = "1\n2\n3\n4\n5\n";
        let mine = "1\nX\nX\n4\n5\n"; // changes 2..3
        let yours = "1\n2\nY\nY\n5\n"; // changes 3..4
        let outcome = merge(base, mine, yours);
        assert_eq!(
            outcome,
            MergeOutcome::Conflicting(
                "1\n<<<<<<< mine\nX\nX\n4\n=======\n2\nY\nY\n>>>>>>> yours\n5\n".to_string()
            )
        );
    }

    #[test]
    fn test_conflict_at_unterminated_last_line() {
        let outcome = merge("a\nb", "a\nmine", "a\nyours");
        assert_eq!(
            outcome,
            MergeOutcome::Conflicting("a\n<<<<<<< mine\nmine\n=======\nyours\n>>>>>>> yours\n".to_string())
        );
    }

    #[test]
    fn test_custom_labels() {
        let engine = MergeEngine::new(Box::new(LineMerger::new(ConflictLabels {
            mine: "my edit".into(),
            yours: "revision 150".into(),
        })));
        let outcome = engine.merge("a\n", "b\n", "c\n");
        let text = outcome.text().unwrap();
        assert!(text.starts_with("<<<<<<< my edit\n"));
        assert!(text.ends_with(">>>>>>> revision 150\n"));
    }

    #[test]
    fn test_clean_merge_is_idempotent() {
        let mine = "First paragraph modified by user 1\n\nSecond paragraph\n\nThird paragraph";
        let yours = "First paragraph\n\nSecond paragraph\n\nThird paragraph modified by user 2";
        let merged = match merge(THREE_PARAGRAPHS, mine, yours) {
            MergeOutcome::Clean(text) => text,
            other => panic!("expected clean merge, got {:?}", other),
        };
        assert_eq!(
            merge(THREE_PARAGRAPHS, &merged, &merged),
            MergeOutcome::Clean(merged.clone())
        );
    }

    #[test]
    fn test_conflict_detection_is_symmetric() {
        let mine = "First paragraph modified by user 1\n\nSecond paragraph\n\nThird paragraph";
        let yours = "First paragraph modified by user 2\n\nSecond paragraph\n\nThird paragraph";
        assert!(merge(THREE_PARAGRAPHS, mine, yours).is_conflicting());
        assert!(merge(THREE_PARAGRAPHS, yours, mine).is_conflicting());
    }

    #[test]
    fn test_moved_lines_merge_in_place() {
        assert_eq!(
            merge("c\nb\nx\ny\nz\n", "b\nb\nc\nx\ny\nz\n", "c\nb\nx\ny\nZ\n"),
            MergeOutcome::Clean("b\nb\nc\nx\ny\nZ\n".to_string())
        );
    }

    #[test]
    fn test_reordered_lines_against_deletion_do_not_panic() {
        let base = "aa\naa\nb\nc\n";
        let reordered = "b\nb\na\na\nc\na\na\n";
        for outcome in [merge(base, "", reordered), merge(base, reordered, "")] {
            assert!(!outcome.is_failed());
            assert!(outcome.text().is_some());
        }
    }

    #[test]
    fn test_base_lines_outside_hunks_preserved() {
        let base = "keep1\nchange\nkeep2\nkeep3\n";
        let mine = "keep1\nmine\nkeep2\nkeep3\n";
        let yours = "keep1\nyours\nkeep2\nkeep3\n";
        let text = merge(base, mine, yours).text().unwrap().to_string();
        let kept: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("keep"))
            .collect();
        assert_eq!(kept, vec!["keep1", "keep2", "keep3"]);
    }

    #[test]
    fn test_can_auto_merge() {
        let engine = MergeEngine::builtin();
        let base = "aaa\nbbb\nccc\n";
        assert!(engine.can_auto_merge(base, base, base));
        assert!(engine.can_auto_merge(base, "AAA\nbbb\nccc\n", "aaa\nbbb\nCCC\n"));
        assert!(!engine.can_auto_merge(base, "aaa\nmine\nccc\n", "aaa\ntheirs\nccc\n"));
    }

    #[test]
    fn test_failing_backend_maps_to_failed() {
        struct Broken;
        impl MergeBackend for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn three_way(&self, _: &str, _: &str, _: &str) -> Result<MergeOutcome, MergeError> {
                Err(MergeError::Diff3NotConfigured)
            }
        }

        let engine = MergeEngine::new(Box::new(Broken));
        assert_eq!(engine.merge("a\n", "b\n", "c\n"), MergeOutcome::Failed);
        // Fast paths never reach the backend.
        assert_eq!(engine.merge("a\n", "a\n", "c\n"), MergeOutcome::Clean("c\n".to_string()));
    }

    #[test]
    fn test_outcome_serde() {
        let json = serde_json::to_string(&MergeOutcome::Clean("x".into())).unwrap();
        assert_eq!(json, r#"{"outcome":"clean","text":"x"}"#);
        let json = serde_json::to_string(&MergeOutcome::Failed).unwrap();
        assert_eq!(json, r#"{"outcome":"failed"}"#);
    }

    #[test]
    fn test_from_config_selects_backend() {
        let mut config = AppConfig::default();
        assert_eq!(MergeEngine::from_config(&config).backend_name(), "builtin");
        config.merge.backend = MergeBackendKind::Diff3;
        assert_eq!(MergeEngine::from_config(&config).backend_name(), "diff3");
    }
}
