/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

//! Push/new/edit/bookmark/diff semantics layered on top of MetaStore and
//! ObjectStore: readonly enforcement, `.pogoignore` evaluation, and
//! three-way merge on conflicting file versions.

mod diff;
mod engine;
mod error;
mod ignore_rules;
mod merge;

pub use diff::{diff_binary, diff_text, DiffAlgorithm, FileDiff, FileStatus, Hunk, MAX_DIFF_SIZE};
pub use engine::{ChangeEngine, EditedFile, PushedFile};
pub use error::ChangeEngineError;
pub use ignore_rules::IgnoreRules;
pub use merge::{has_conflict_markers, three_way_merge, MergeResult};
