/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::sync::Arc;

use chrono::Utc;
use objectstore::{FsObjectStore, ObjectStore};
use pogo_types::FileType;

fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

async fn setup() -> (
    Arc<metastore::MetaStore>,
    Arc<dyn ObjectStore>,
    tempfile::TempDir,
) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("pogo.sqlite");
    let meta = Arc::new(
        metastore::MetaStore::open(db_path.to_str().unwrap())
            .await
            .unwrap(),
    );
    let objects: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path().join("objects")));
    (meta, objects, dir)
}

#[tokio::test]
async fn sweeps_unreferenced_files_and_blobs() {
    let (meta, objects, _dir) = setup().await;
    let repo = meta.create_repository("acme", true).await.unwrap();
    let change = meta
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();

    let kept_hash = objects
        .put_bytes(bytes::Bytes::from_static(b"kept"))
        .await
        .unwrap();
    let orphan_hash = objects
        .put_bytes(bytes::Bytes::from_static(b"orphaned"))
        .await
        .unwrap();

    let kept_file_id = meta
        .upsert_file("kept.txt", false, &kept_hash.to_string(), FileType::empty())
        .await
        .unwrap();
    meta.add_file_to_change(change.row_id, kept_file_id)
        .await
        .unwrap();

    let orphan_file_id = meta
        .upsert_file(
            "orphan.txt",
            false,
            &orphan_hash.to_string(),
            FileType::empty(),
        )
        .await
        .unwrap();
    // Never associated with any change: an unreferenced File row.
    let _ = orphan_file_id;

    let collector = Arc::new(gc::GarbageCollector::new(
        meta.clone(),
        objects.clone(),
        gc::GcLock::new(),
        test_logger(),
    ));
    let report = collector.run().await.unwrap();

    assert_eq!(report.deleted_db_files, 1);
    assert!(objects.exists(&kept_hash).await.unwrap());
    assert!(!objects.exists(&orphan_hash).await.unwrap());
}

#[tokio::test]
async fn deletes_ci_runs_older_than_retention() {
    let (meta, objects, _dir) = setup().await;
    let repo = meta.create_repository("acme", true).await.unwrap();
    meta.record_ci_run(repo.id).await.unwrap();

    let collector = Arc::new(
        gc::GarbageCollector::new(meta.clone(), objects.clone(), gc::GcLock::new(), test_logger())
            .with_ci_run_retention_hours(-1),
    );
    let report = collector.run().await.unwrap();
    assert_eq!(report.deleted_ci_runs, 1);

    let cutoff = Utc::now().naive_utc() + chrono::Duration::hours(1);
    assert_eq!(meta.delete_ci_runs_before(cutoff).await.unwrap(), 0);
}

/// S5 -- GC race: a blob loses its only reference on one change and gains a
/// new one on another while both pushes are still in flight (holding the
/// shared read lease); GC must not start until they release it, and once it
/// does run the blob is still referenced and survives.
#[tokio::test]
async fn gc_waits_for_in_flight_pushes_and_preserves_a_re_referenced_blob() {
    let (meta, objects, _dir) = setup().await;
    let repo = meta.create_repository("acme", true).await.unwrap();
    let change_a = meta
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();
    let change_b = meta
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();

    let hash = objects
        .put_bytes(bytes::Bytes::from_static(b"shared"))
        .await
        .unwrap();
    let file_id = meta
        .upsert_file("shared.txt", false, &hash.to_string(), FileType::empty())
        .await
        .unwrap();
    meta.add_file_to_change(change_a.row_id, file_id)
        .await
        .unwrap();

    let gc_lock = gc::GcLock::new();
    let collector = Arc::new(gc::GarbageCollector::new(
        meta.clone(),
        objects.clone(),
        gc_lock.clone(),
        test_logger(),
    ));

    // Simulate both in-flight pushes holding the mutator read lease.
    let push_lease = gc_lock.acquire_read().await;

    let gc_collector = collector.clone();
    let gc_handle = tokio::spawn(async move { gc_collector.run().await });
    // Give the spawned task a chance to reach (and block on) the write lease.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(!gc_handle.is_finished(), "GC ran before the read lease was released");

    // Push A removes the last reference on change_a; push B adds a new one
    // on change_b -- both complete while GC is still waiting.
    meta.remove_file_from_change(change_a.row_id, file_id)
        .await
        .unwrap();
    meta.add_file_to_change(change_b.row_id, file_id)
        .await
        .unwrap();

    drop(push_lease);
    let report = gc_handle.await.unwrap().unwrap();

    assert_eq!(report.deleted_db_files, 0);
    assert!(objects.exists(&hash).await.unwrap());
}

#[tokio::test]
async fn batched_strategy_also_sweeps_orphans() {
    let (meta, objects, _dir) = setup().await;
    let orphan_hash = objects
        .put_bytes(bytes::Bytes::from_static(b"batched-orphan"))
        .await
        .unwrap();

    let collector = Arc::new(
        gc::GarbageCollector::new(meta.clone(), objects.clone(), gc::GcLock::new(), test_logger())
            .with_gc_memory_threshold(0),
    );
    let report = collector.run().await.unwrap();
    assert_eq!(report.deleted_disk_files, 1);
    assert!(!objects.exists(&orphan_hash).await.unwrap());
}
