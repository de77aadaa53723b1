/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcError {
    #[error(transparent)]
    MetaStore(#[from] metastore::MetaStoreError),

    #[error(transparent)]
    ObjectStore(#[from] objectstore::ObjectStoreError),
}

impl From<GcError> for pogo_types::PogoError {
    fn from(e: GcError) -> Self {
        match e {
            GcError::MetaStore(inner) => inner.into(),
            GcError::ObjectStore(inner) => inner.into(),
        }
    }
}
