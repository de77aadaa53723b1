/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use serde::{Deserialize, Serialize};

/// Text encoding detected (or assigned) for a file, prior to canonicalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
    /// Size-zero files and files whose encoding could not be determined.
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineEnding {
    Lf,
    Crlf,
    Unknown,
}

/// The classification FileTyper produces on ingest and consumes on egress.
/// Stored alongside a File's canonical bytes so the original encoding and
/// line ending can be restored by `edit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileType {
    pub binary: bool,
    pub encoding: Encoding,
    pub bom: bool,
    pub line_ending: LineEnding,
}

impl FileType {
    pub fn empty() -> Self {
        FileType {
            binary: false,
            encoding: Encoding::Unknown,
            bom: false,
            line_ending: LineEnding::Unknown,
        }
    }

    pub fn binary() -> Self {
        FileType {
            binary: true,
            encoding: Encoding::Unknown,
            bom: false,
            line_ending: LineEnding::Unknown,
        }
    }

    /// Three-way merge of metadata: each axis takes whichever side differs
    /// from the base; if both sides agree, that shared value wins; if both
    /// sides differ from the base *and* from each other, the base value
    /// wins (a tie). This makes the merge commutative in the two non-base
    /// sides, which the test suite verifies directly.
    pub fn three_way_merge(base: &FileType, a: &FileType, b: &FileType) -> FileType {
        FileType {
            binary: merge_axis(base.binary, a.binary, b.binary),
            encoding: merge_axis(base.encoding, a.encoding, b.encoding),
            bom: merge_axis(base.bom, a.bom, b.bom),
            line_ending: merge_axis(base.line_ending, a.line_ending, b.line_ending),
        }
    }
}

fn merge_axis<T: PartialEq + Copy>(base: T, a: T, b: T) -> T {
    if a == b {
        a
    } else if a == base {
        b
    } else if b == base {
        a
    } else {
        base
    }
}
