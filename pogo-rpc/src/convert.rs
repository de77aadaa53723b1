/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use changeengine::{DiffAlgorithm, FileStatus};
use pogo_types::{Encoding, FileType, LineEnding, PogoError};

use crate::pogo::v1 as pb;

pub fn encoding_to_pb(e: Encoding) -> i32 {
    (match e {
        Encoding::Unknown => pb::Encoding::Unknown,
        Encoding::Utf8 => pb::Encoding::Utf8,
        Encoding::Utf16Le => pb::Encoding::Utf16Le,
        Encoding::Utf16Be => pb::Encoding::Utf16Be,
        Encoding::Utf32Le => pb::Encoding::Utf32Le,
        Encoding::Utf32Be => pb::Encoding::Utf32Be,
    }) as i32
}

pub fn encoding_from_pb(e: i32) -> Encoding {
    match pb::Encoding::try_from(e).unwrap_or(pb::Encoding::Unknown) {
        pb::Encoding::Unknown => Encoding::Unknown,
        pb::Encoding::Utf8 => Encoding::Utf8,
        pb::Encoding::Utf16Le => Encoding::Utf16Le,
        pb::Encoding::Utf16Be => Encoding::Utf16Be,
        pb::Encoding::Utf32Le => Encoding::Utf32Le,
        pb::Encoding::Utf32Be => Encoding::Utf32Be,
    }
}

pub fn line_ending_to_pb(l: LineEnding) -> i32 {
    (match l {
        LineEnding::Unknown => pb::LineEnding::Unknown,
        LineEnding::Lf => pb::LineEnding::Lf,
        LineEnding::Crlf => pb::LineEnding::Crlf,
    }) as i32
}

pub fn line_ending_from_pb(l: i32) -> LineEnding {
    match pb::LineEnding::try_from(l).unwrap_or(pb::LineEnding::Unknown) {
        pb::LineEnding::Unknown => LineEnding::Unknown,
        pb::LineEnding::Lf => LineEnding::Lf,
        pb::LineEnding::Crlf => LineEnding::Crlf,
    }
}

pub fn file_type_to_pb(ft: FileType) -> pb::FileType {
    pb::FileType {
        binary: ft.binary,
        encoding: encoding_to_pb(ft.encoding),
        bom: ft.bom,
        line_ending: line_ending_to_pb(ft.line_ending),
    }
}

pub fn file_type_from_pb(ft: &pb::FileType) -> FileType {
    FileType {
        binary: ft.binary,
        encoding: encoding_from_pb(ft.encoding),
        bom: ft.bom,
        line_ending: line_ending_from_pb(ft.line_ending),
    }
}

pub fn diff_algorithm_from_pb(a: i32) -> DiffAlgorithm {
    match pb::DiffAlgorithm::try_from(a).unwrap_or(pb::DiffAlgorithm::Myers) {
        pb::DiffAlgorithm::Myers => DiffAlgorithm::Myers,
        pb::DiffAlgorithm::Patience => DiffAlgorithm::Patience,
    }
}

pub fn file_status_to_pb(s: FileStatus) -> i32 {
    (match s {
        FileStatus::Modified => pb::FileStatus::Modified,
        FileStatus::Added => pb::FileStatus::Added,
        FileStatus::Removed => pb::FileStatus::Removed,
        FileStatus::Binary => pb::FileStatus::Binary,
    }) as i32
}

/// Maps the stable `PogoError` kind (spec §7) onto a gRPC status code; the
/// human message rides through verbatim so nothing is swallowed.
pub fn pogo_error_to_status(e: PogoError) -> tonic::Status {
    let message = e.to_string();
    let code = match e.kind() {
        "AuthError" => tonic::Code::Unauthenticated,
        "AccessDenied" => tonic::Code::PermissionDenied,
        "NotFound" => tonic::Code::NotFound,
        "Ambiguous" => tonic::Code::FailedPrecondition,
        "Readonly" => tonic::Code::FailedPrecondition,
        "Conflict" => tonic::Code::Aborted,
        "InvalidInput" => tonic::Code::InvalidArgument,
        "IOError" => tonic::Code::Internal,
        "Transient" => tonic::Code::Unavailable,
        _ => tonic::Code::Unknown,
    };
    tonic::Status::new(code, message)
}
