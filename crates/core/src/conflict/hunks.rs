//! Line hunks between a base text and one derivative.
//!
//! Uses the `similar` crate (Myers diff) over lines that keep their `\n`
//! terminator, so the last line of a text without a trailing newline is a
//! different line from the same content followed by a newline.

use std::ops::Range;

use similar::{capture_diff_slices, Algorithm, DiffTag};

/// Split text into lines, keeping each line's terminator.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// A maximal run of base lines replaced by a run of derivative lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hunk<'a> {
    /// Half-open range of base line indices; empty for a pure insertion.
    pub base_range: Range<usize>,
    /// Lines that replace `base_range`.
    pub replacement: Vec<&'a str>,
}

impl<'a> Hunk<'a> {
    /// Whether this hunk only inserts lines before `base_range.start`.
    pub fn is_insertion(&self) -> bool {
        self.base_range.is_empty()
    }

    /// Positional overlap between hunks of two different derivatives.
    ///
    /// Non-empty ranges overlap when they share a base line. Two insertions
    /// overlap when they sit at the same base position. An insertion overlaps
    /// a non-empty range only when it falls strictly inside it.
    pub fn overlaps(&self, other: &Hunk<'_>) -> bool {
        let (a, b) = (&self.base_range, &other.base_range);
        if a.is_empty() && b.is_empty() {
            return a.start == b.start;
        }
        a.start < b.end && b.start < a.end
    }
}

/// Compute the hunks turning `base` into `derived`.
///
/// Hunks are the gaps between the matched line blocks of a Myers diff, so
/// they come out in base order, never overlap, are separated by at least one
/// unchanged base line, and rebuild `derived` exactly when applied to
/// `base`. Only `Equal` ops are used: the positions `similar` reports for
/// inserts and deletes are not relied on.
pub fn diff_hunks<'a>(base: &[&str], derived: &[&'a str]) -> Vec<Hunk<'a>> {
    let mut hunks = Vec::new();
    let (mut old_pos, mut new_pos) = (0, 0);

    let matched = capture_diff_slices(Algorithm::Myers, base, derived)
        .into_iter()
        .filter_map(|op| match op.as_tag_tuple() {
            (DiffTag::Equal, old, new) if !old.is_empty() => Some((old, new)),
            _ => None,
        });

    let end = (base.len()..base.len(), derived.len()..derived.len());

    for (old, new) in matched.chain(std::iter::once(end)) {
        // Blocks that step backwards or do not really match are treated as
        // changed lines.
        if old.start < old_pos
            || new.start < new_pos
            || base[old.clone()] != derived[new.clone()]
        {
            continue;
        }
        if old.start > old_pos || new.start > new_pos {
            hunks.push(Hunk {
                base_range: old_pos..old.start,
                replacement: derived[new_pos..new.start].to_vec(),
            });
        }
        old_pos = old.end;
        new_pos = new.end;
    }

    debug_assert!(hunks
        .windows(2)
        .all(|w| w[0].base_range.end < w[1].base_range.start));
    hunks
}

/// Apply `hunks` (sorted, all inside `range`) to `base[range]`.
pub fn apply_hunks<'a>(base: &[&'a str], range: Range<usize>, hunks: &[&Hunk<'a>]) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut pos = range.start;
    for hunk in hunks {
        debug_assert!(pos <= hunk.base_range.start, "hunks out of base order");
        out.extend_from_slice(&base[pos..hunk.base_range.start]);
        out.extend_from_slice(&hunk.replacement);
        pos = hunk.base_range.end;
    }
    out.extend_from_slice(&base[pos..range.end]);
    out
}
