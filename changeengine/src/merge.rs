/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use similar::{ChangeTag, TextDiff};

/// Result of a three-way textual merge: the merged text (with conflict
/// markers inserted where the two sides disagree) and whether any conflict
/// markers were emitted.
pub struct MergeResult {
    pub text: String,
    pub has_conflicts: bool,
}

/// Standard diff3-style merge: lines unchanged from `base` on one side take
/// the other side's value; lines changed identically on both sides collapse
/// to that value; lines changed differently are wrapped in conflict markers
/// (spec.md §4.4.4). Operates line-wise so line endings must already be
/// canonical LF.
pub fn three_way_merge(base: &str, a: &str, b: &str) -> MergeResult {
    let base_lines: Vec<&str> = base.split_inclusive('\n').collect();
    let a_lines: Vec<&str> = a.split_inclusive('\n').collect();
    let b_lines: Vec<&str> = b.split_inclusive('\n').collect();

    let hunks_a = diff_hunks(&base_lines, &a_lines);
    let hunks_b = diff_hunks(&base_lines, &b_lines);

    let mut out = String::new();
    let mut has_conflicts = false;
    let mut i = 0usize;
    let mut ai = 0usize;
    let mut bi = 0usize;

    while i < base_lines.len() {
        let next_a = hunks_a.get(ai).filter(|h| h.base_start == i);
        let next_b = hunks_b.get(bi).filter(|h| h.base_start == i);

        match (next_a, next_b) {
            (None, None) => {
                out.push_str(base_lines[i]);
                i += 1;
            }
            (Some(ha), None) => {
                out.extend(ha.lines.iter().copied());
                // A pure insertion (base_end == base_start == i) leaves the
                // base line at `i` unconsumed; only a Delete-bearing hunk
                // (base_end > i) actually advances the cursor.
                i = ha.base_end;
                ai += 1;
            }
            (None, Some(hb)) => {
                out.extend(hb.lines.iter().copied());
                i = hb.base_end;
                bi += 1;
            }
            (Some(ha), Some(hb)) => {
                if ha.lines == hb.lines && ha.base_end == hb.base_end {
                    out.extend(ha.lines.iter().copied());
                } else {
                    has_conflicts = true;
                    out.push_str("<<<<<<<\n");
                    out.extend(ha.lines.iter().copied());
                    out.push_str("=======\n");
                    out.extend(hb.lines.iter().copied());
                    out.push_str(">>>>>>>\n");
                }
                i = ha.base_end.max(hb.base_end);
                ai += 1;
                bi += 1;
            }
        }
    }

    MergeResult {
        text: out,
        has_conflicts,
    }
}

/// `true` iff `text` contains all three conflict marker triples, i.e. it
/// still has unresolved merge conflicts (spec.md §4.4.4's `HasConflictMarkers`).
pub fn has_conflict_markers(text: &str) -> bool {
    text.contains("<<<<<<<\n") && text.contains("=======\n") && text.contains(">>>>>>>\n")
}

struct Hunk<'a> {
    base_start: usize,
    base_end: usize,
    lines: Vec<&'a str>,
}

fn diff_hunks<'a>(base: &[&'a str], other: &[&'a str]) -> Vec<Hunk<'a>> {
    let diff = TextDiff::from_slices(base, other);
    let mut hunks = Vec::new();
    let mut pending: Option<Hunk<'a>> = None;
    // Tracks how many base lines have been consumed so far (by Equal or
    // Delete), since a pure Insert with nothing pending has no `old_index`
    // of its own -- it anchors at wherever the base cursor currently sits.
    let mut base_idx = 0usize;

    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Equal => {
                if let Some(hunk) = pending.take() {
                    hunks.push(hunk);
                }
                base_idx += 1;
            }
            ChangeTag::Delete => {
                let idx = change.old_index().unwrap();
                let hunk = pending.get_or_insert_with(|| Hunk {
                    base_start: idx,
                    base_end: idx,
                    lines: Vec::new(),
                });
                hunk.base_end = idx + 1;
                base_idx = idx + 1;
            }
            ChangeTag::Insert => {
                let base_pos = change
                    .old_index()
                    .or_else(|| pending.as_ref().map(|h| h.base_end))
                    .unwrap_or(base_idx);
                let hunk = pending.get_or_insert_with(|| Hunk {
                    base_start: base_pos,
                    base_end: base_pos,
                    lines: Vec::new(),
                });
                hunk.lines.push(change.value());
            }
        }
    }
    if let Some(hunk) = pending.take() {
        hunks.push(hunk);
    }
    hunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmodified_side_takes_the_others_edit() {
        let base = "a\nb\nc\n";
        let a = "a\nB\nc\n";
        let b = base;
        let merged = three_way_merge(base, a, b);
        assert!(!merged.has_conflicts);
        assert_eq!(merged.text, "a\nB\nc\n");
    }

    #[test]
    fn identical_edits_on_both_sides_do_not_conflict() {
        let base = "a\nb\nc\n";
        let a = "a\nB\nc\n";
        let b = "a\nB\nc\n";
        let merged = three_way_merge(base, a, b);
        assert!(!merged.has_conflicts);
        assert_eq!(merged.text, "a\nB\nc\n");
    }

    #[test]
    fn conflicting_edits_produce_markers() {
        let base = "a\nb\nc\n";
        let a = "a\nB1\nc\n";
        let b = "a\nB2\nc\n";
        let merged = three_way_merge(base, a, b);
        assert!(merged.has_conflicts);
        assert!(has_conflict_markers(&merged.text));
        assert!(merged.text.contains("B1"));
        assert!(merged.text.contains("B2"));
    }

    #[test]
    fn clean_insertion_with_no_adjacent_deletion_lands_at_its_real_position() {
        let base = "x\ny\n";
        let a = base;
        let b = "x\nz\ny\n";
        let merged = three_way_merge(base, a, b);
        assert!(!merged.has_conflicts);
        assert_eq!(merged.text, "x\nz\ny\n");
    }

    #[test]
    fn disjoint_edits_both_survive() {
        let base = "a\nb\nc\nd\n";
        let a = "A\nb\nc\nd\n";
        let b = "a\nb\nc\nD\n";
        let merged = three_way_merge(base, a, b);
        assert!(!merged.has_conflicts);
        assert_eq!(merged.text, "A\nb\nc\nD\n");
    }
}
