/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChangeEngineError {
    #[error(transparent)]
    MetaStore(#[from] metastore::MetaStoreError),

    #[error(transparent)]
    ObjectStore(#[from] objectstore::ObjectStoreError),

    #[error(transparent)]
    FileTyper(#[from] filetyper::FileTyperError),

    #[error("change {0:?} is readonly")]
    Readonly(String),

    #[error("access denied for {0:?} on repository {1:?}")]
    AccessDenied(String, String),

    #[error("no common ancestor found for a three-way merge of {0:?}")]
    NoMergeBase(String),

    #[error("repository {0:?} already exists")]
    RepositoryExists(String),

    #[error("stored content hash {0:?} is not well-formed")]
    CorruptData(String),

    #[error("change {0:?} has children and cannot be removed")]
    HasChildren(String),
}

impl From<ChangeEngineError> for pogo_types::PogoError {
    fn from(e: ChangeEngineError) -> Self {
        match e {
            ChangeEngineError::MetaStore(inner) => inner.into(),
            ChangeEngineError::ObjectStore(inner) => inner.into(),
            ChangeEngineError::FileTyper(inner) => inner.into(),
            ChangeEngineError::Readonly(_) => pogo_types::PogoError::readonly(e.to_string()),
            ChangeEngineError::AccessDenied(_, _) => {
                pogo_types::PogoError::access_denied(e.to_string())
            }
            ChangeEngineError::RepositoryExists(_) => {
                pogo_types::PogoError::invalid_input(e.to_string())
            }
            ChangeEngineError::NoMergeBase(_) => pogo_types::PogoError::conflict(e.to_string()),
            ChangeEngineError::CorruptData(_) => {
                pogo_types::PogoError::transient(e.to_string())
            }
            ChangeEngineError::HasChildren(_) => pogo_types::PogoError::readonly(e.to_string()),
        }
    }
}
