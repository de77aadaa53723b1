/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetaStoreError {
    #[error("database error: {0}")]
    Db(#[from] diesel::result::Error),

    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("repository {0:?} already exists")]
    RepositoryExists(String),

    #[error("repository {0:?} not found")]
    RepositoryNotFound(String),

    #[error("change {0:?} not found in repository")]
    ChangeNotFound(String),

    #[error("ambiguous revision {0:?}: matches {1} changes")]
    Ambiguous(String, usize),

    #[error("bookmark {0:?} not found")]
    BookmarkNotFound(String),

    #[error("parent set would introduce a cycle")]
    Cycle,

    #[error("background task panicked: {0}")]
    Join(String),
}

impl From<MetaStoreError> for pogo_types::PogoError {
    fn from(e: MetaStoreError) -> Self {
        match &e {
            MetaStoreError::RepositoryNotFound(_)
            | MetaStoreError::ChangeNotFound(_)
            | MetaStoreError::BookmarkNotFound(_) => pogo_types::PogoError::not_found(e.to_string()),
            MetaStoreError::Ambiguous(_, _) => pogo_types::PogoError::ambiguous(e.to_string()),
            MetaStoreError::RepositoryExists(_) | MetaStoreError::Cycle => {
                pogo_types::PogoError::invalid_input(e.to_string())
            }
            MetaStoreError::Pool(_) | MetaStoreError::Join(_) => {
                pogo_types::PogoError::transient(e.to_string())
            }
            MetaStoreError::Db(_) | MetaStoreError::Migration(_) => {
                pogo_types::PogoError::transient(e.to_string())
            }
        }
    }
}
