/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use metastore::MetaStore;
use objectstore::ObjectStore;
use slog::{info, warn, Logger};

use crate::error::GcError;
use crate::lock::GcLock;

/// Above this many File rows, GC switches from an in-memory hash-set sweep
/// to a batched per-hash `CheckFileHashExists` sweep (spec.md §4.5.2 step 3).
pub const DEFAULT_GC_MEMORY_THRESHOLD: i64 = 10_000_000;

/// CI run log retention (spec.md §4.5.2 step 5 / §6.6).
pub const DEFAULT_CI_RUN_RETENTION_HOURS: i64 = 720;

const BATCH_SIZE: usize = 1000;

#[derive(Debug, Default, Clone, Copy)]
pub struct GcReport {
    pub deleted_db_files: usize,
    pub deleted_disk_files: usize,
    pub bytes_freed: u64,
    pub deleted_ci_runs: usize,
}

pub struct GarbageCollector {
    meta: Arc<MetaStore>,
    objects: Arc<dyn ObjectStore>,
    lock: GcLock,
    logger: Logger,
    gc_memory_threshold: i64,
    ci_run_retention_hours: i64,
}

impl GarbageCollector {
    pub fn new(
        meta: Arc<MetaStore>,
        objects: Arc<dyn ObjectStore>,
        lock: GcLock,
        logger: Logger,
    ) -> Self {
        GarbageCollector {
            meta,
            objects,
            lock,
            logger,
            gc_memory_threshold: DEFAULT_GC_MEMORY_THRESHOLD,
            ci_run_retention_hours: DEFAULT_CI_RUN_RETENTION_HOURS,
        }
    }

    pub fn with_gc_memory_threshold(mut self, threshold: i64) -> Self {
        self.gc_memory_threshold = threshold;
        self
    }

    pub fn with_ci_run_retention_hours(mut self, hours: i64) -> Self {
        self.ci_run_retention_hours = hours;
        self
    }

    /// Runs one full GC pass under the write lease, blocking until every
    /// in-flight read-leased (mutating) operation has finished.
    pub async fn run(&self) -> Result<GcReport, GcError> {
        let _write_guard = self.lock.inner().write_owned().await;
        info!(self.logger, "gc pass starting");

        let deleted_db_files = self.meta.delete_unreachable_files().await?;
        let total_files = self.meta.count_files().await?;

        let deleted_disk_files = if total_files < self.gc_memory_threshold {
            self.sweep_in_memory().await?
        } else {
            self.sweep_batched().await?
        };

        self.objects.prune_empty_shards().await?;

        let cutoff = Utc::now().naive_utc() - Duration::hours(self.ci_run_retention_hours);
        let deleted_ci_runs = self.meta.delete_ci_runs_before(cutoff).await?;

        let report = GcReport {
            deleted_db_files,
            deleted_disk_files: deleted_disk_files.0,
            bytes_freed: deleted_disk_files.1,
            deleted_ci_runs,
        };
        info!(self.logger, "gc pass complete";
            "deleted_db_files" => report.deleted_db_files,
            "deleted_disk_files" => report.deleted_disk_files,
            "bytes_freed" => report.bytes_freed,
            "deleted_ci_runs" => report.deleted_ci_runs,
        );
        Ok(report)
    }

    /// Fetches every still-reachable content hash into a set and deletes
    /// any on-disk blob absent from it.
    async fn sweep_in_memory(&self) -> Result<(usize, u64), GcError> {
        let reachable: HashSet<String> = self.meta.get_all_file_hashes().await?.into_iter().collect();
        let on_disk = self.objects.list_all().await?;

        let mut deleted = 0usize;
        let mut bytes_freed = 0u64;
        for hash in on_disk {
            if reachable.contains(&hash.to_string()) {
                continue;
            }
            bytes_freed += self.delete_one(&hash).await;
            deleted += 1;
        }
        Ok((deleted, bytes_freed))
    }

    /// Walks the object store in fixed-size batches, checking each hash's
    /// reachability with a DB round trip rather than holding the full
    /// reachable set in memory.
    async fn sweep_batched(&self) -> Result<(usize, u64), GcError> {
        let on_disk = self.objects.list_all().await?;
        let mut deleted = 0usize;
        let mut bytes_freed = 0u64;

        for batch in on_disk.chunks(BATCH_SIZE) {
            for hash in batch {
                if self.meta.check_file_hash_exists(&hash.to_string()).await? {
                    continue;
                }
                bytes_freed += self.delete_one(hash).await;
                deleted += 1;
            }
        }
        Ok((deleted, bytes_freed))
    }

    /// Best-effort single-blob delete: a failure here is logged and does
    /// not abort the sweep (spec.md §4.5.4).
    async fn delete_one(&self, hash: &pogo_types::ContentHash) -> u64 {
        let size = match self.objects.open(hash).await {
            Ok((bytes, _)) => bytes.len() as u64,
            Err(_) => 0,
        };
        if let Err(e) = self.objects.delete(hash).await {
            warn!(self.logger, "failed to delete unreachable blob"; "hash" => %hash, "error" => %e);
            return 0;
        }
        size
    }
}
