/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, RwLock};

/// Process-wide `gcMutex` (spec.md §4.5.1/§5): push/new/edit/diff hold a
/// read lease for their duration, GC holds the write lease. An async
/// `RwLock` rather than a blocking one, since mutators suspend on I/O while
/// holding it.
#[derive(Clone)]
pub struct GcLock {
    inner: Arc<RwLock<()>>,
}

impl GcLock {
    pub fn new() -> Self {
        GcLock {
            inner: Arc::new(RwLock::new(())),
        }
    }

    /// Acquired by mutating RPCs around the duration of their operation.
    pub async fn acquire_read(&self) -> OwnedRwLockReadGuard<()> {
        self.inner.clone().read_owned().await
    }

    pub(crate) fn inner(&self) -> Arc<RwLock<()>> {
        self.inner.clone()
    }
}

impl Default for GcLock {
    fn default() -> Self {
        Self::new()
    }
}
