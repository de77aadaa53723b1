/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileTyperError {
    #[error("file exceeds the {0} byte size cap")]
    TooLarge(u64),

    #[error("invalid {0} byte sequence at offset {1}")]
    Malformed(&'static str, usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FileTyperError> for pogo_types::PogoError {
    fn from(e: FileTyperError) -> Self {
        match e {
            FileTyperError::Io(io) => pogo_types::PogoError::Io(io),
            other => pogo_types::PogoError::invalid_input(other.to_string()),
        }
    }
}
