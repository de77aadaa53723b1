/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob stream error: {0}")]
    Stream(String),

    #[error("compression error: {0}")]
    Compression(String),
}

impl From<ObjectStoreError> for pogo_types::PogoError {
    fn from(e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::Io(io) => pogo_types::PogoError::Io(io),
            other => pogo_types::PogoError::invalid_input(other.to_string()),
        }
    }
}
