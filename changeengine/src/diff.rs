/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, TextDiff};

/// Per-file size cap beyond which a diff is metadata-only unless the caller
/// opts in, per spec.md §4.4.7.
pub const MAX_DIFF_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Added,
    Removed,
    Modified,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffAlgorithm {
    Myers,
    Patience,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hunk {
    pub header: String,
    pub lines: Vec<(char, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub status: FileStatus,
    /// `None` when the file is binary or exceeds [`MAX_DIFF_SIZE`] without
    /// an explicit opt-in; in that case the diff is metadata-only.
    pub hunks: Option<Vec<Hunk>>,
}

/// Computes hunks for a textual modification using the requested algorithm.
/// `allow_large` opts into diffing files over [`MAX_DIFF_SIZE`].
pub fn diff_text(
    path: &str,
    old: &str,
    new: &str,
    algorithm: DiffAlgorithm,
    allow_large: bool,
) -> FileDiff {
    if !allow_large && (old.len() > MAX_DIFF_SIZE || new.len() > MAX_DIFF_SIZE) {
        return FileDiff {
            path: path.to_string(),
            status: FileStatus::Modified,
            hunks: None,
        };
    }

    let sim_algo = match algorithm {
        DiffAlgorithm::Myers => Algorithm::Myers,
        DiffAlgorithm::Patience => Algorithm::Patience,
    };
    let diff = TextDiff::configure()
        .algorithm(sim_algo)
        .diff_lines(old, new);

    let mut hunks = Vec::new();
    for group in diff.grouped_ops(3) {
        let mut lines = Vec::new();
        let (mut old_start, mut old_len, mut new_start, mut new_len) = (0usize, 0usize, 0usize, 0usize);
        for (i, op) in group.iter().enumerate() {
            if i == 0 {
                old_start = op.old_range().start;
                new_start = op.new_range().start;
            }
            old_len += op.old_range().len();
            new_len += op.new_range().len();
            for change in diff.iter_changes(op) {
                let tag = match change.tag() {
                    ChangeTag::Equal => ' ',
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                };
                lines.push((tag, change.value().to_string()));
            }
        }
        let header = format!("@@ -{},{} +{},{} @@", old_start + 1, old_len, new_start + 1, new_len);
        hunks.push(Hunk { header, lines });
    }

    FileDiff {
        path: path.to_string(),
        status: FileStatus::Modified,
        hunks: Some(hunks),
    }
}

pub fn diff_binary(path: &str, status: FileStatus) -> FileDiff {
    FileDiff {
        path: path.to_string(),
        status: if matches!(status, FileStatus::Added | FileStatus::Removed) {
            status
        } else {
            FileStatus::Binary
        },
        hunks: None,
    }
}
