/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

//! Integration tests for MetaStore, exercising the transactional compound
//! queries ChangeEngine relies on (spec §4.3).

use pogo_types::{Encoding, FileType, LineEnding};

async fn open_store() -> (metastore::MetaStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pogo.sqlite");
    let store = metastore::MetaStore::open(path.to_str().unwrap())
        .await
        .unwrap();
    (store, dir)
}

#[tokio::test]
async fn create_and_fetch_repository() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    assert_eq!(repo.name, "acme");
    assert!(repo.public);

    let fetched = store.get_repository_by_name("acme").await.unwrap();
    assert_eq!(fetched.id, repo.id);
}

#[tokio::test]
async fn duplicate_repository_name_is_rejected() {
    let (store, _dir) = open_store().await;
    store.create_repository("acme", true).await.unwrap();
    let err = store.create_repository("acme", false).await.unwrap_err();
    assert!(matches!(err, metastore::MetaStoreError::RepositoryExists(_)));
}

#[tokio::test]
async fn public_repository_grants_access_to_anyone() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    assert!(store
        .check_user_repository_access(repo.id, "anyone")
        .await
        .unwrap());
}

#[tokio::test]
async fn private_repository_denies_without_grant() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", false).await.unwrap();
    assert!(!store
        .check_user_repository_access(repo.id, "stranger")
        .await
        .unwrap());
}

#[tokio::test]
async fn root_change_has_no_parents_and_is_not_readonly() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    let root = store
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();

    assert!(store.get_change_parents(root.row_id).await.unwrap().is_empty());
    assert!(!store.is_readonly(root.row_id, "alice").await.unwrap());
}

#[tokio::test]
async fn change_with_a_child_becomes_readonly() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    let root = store
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();
    store
        .create_change(
            repo.id,
            None,
            Some("alice".to_string()),
            vec![root.change_id.clone()],
        )
        .await
        .unwrap();

    assert!(store.is_readonly(root.row_id, "alice").await.unwrap());
}

#[tokio::test]
async fn change_authored_by_someone_else_is_readonly() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    let root = store
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();

    assert!(store.is_readonly(root.row_id, "bob").await.unwrap());
    assert!(!store.is_readonly(root.row_id, "alice").await.unwrap());
}

#[tokio::test]
async fn bookmark_makes_its_target_readonly() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    let root = store
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();

    store
        .set_bookmark(repo.id, "main", root.row_id)
        .await
        .unwrap();
    assert!(store.is_readonly(root.row_id, "alice").await.unwrap());

    store.remove_bookmark(repo.id, "main").await.unwrap();
    assert!(!store.is_readonly(root.row_id, "alice").await.unwrap());
}

#[tokio::test]
async fn find_change_by_unique_prefix() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    let root = store
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();

    let prefix = &root.change_id[..4];
    let found = store
        .find_change_by_name_fuzzy(repo.id, prefix)
        .await
        .unwrap();
    assert_eq!(found.row_id, root.row_id);
}

#[tokio::test]
async fn find_change_by_bookmark_name() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    let root = store
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();
    store
        .set_bookmark(repo.id, "main", root.row_id)
        .await
        .unwrap();

    let found = store
        .find_change_by_name_fuzzy(repo.id, "main")
        .await
        .unwrap();
    assert_eq!(found.row_id, root.row_id);
}

#[tokio::test]
async fn diamond_shaped_parents_do_not_false_positive_as_a_cycle() {
    // `create_change` only ever points a brand-new row at existing rows, so
    // a true cycle can never be constructed through this API -- there is no
    // operation that re-parents an existing change. What *can* happen, and
    // must not be rejected, is a diamond: a change whose two parents share
    // a common ancestor.
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    let root = store
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();
    let left = store
        .create_change(
            repo.id,
            None,
            Some("alice".to_string()),
            vec![root.change_id.clone()],
        )
        .await
        .unwrap();
    let right = store
        .create_change(
            repo.id,
            None,
            Some("alice".to_string()),
            vec![root.change_id.clone()],
        )
        .await
        .unwrap();

    let merge = store
        .create_change(
            repo.id,
            None,
            Some("alice".to_string()),
            vec![left.change_id.clone(), right.change_id.clone()],
        )
        .await
        .unwrap();

    let parents = store.get_change_parents(merge.row_id).await.unwrap();
    assert_eq!(parents.len(), 2);
}

#[tokio::test]
async fn file_lifecycle_upsert_associate_and_unreachable_sweep() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    let change = store
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();

    let ft = FileType {
        binary: false,
        encoding: Encoding::Utf8,
        bom: false,
        line_ending: LineEnding::Lf,
    };
    let file_id = store
        .upsert_file("hello.txt", false, "deadbeef", ft)
        .await
        .unwrap();
    store.add_file_to_change(change.row_id, file_id).await.unwrap();

    assert!(store.check_file_hash_exists("deadbeef").await.unwrap());
    assert_eq!(store.count_files().await.unwrap(), 1);
    assert!(store.get_unreachable_files().await.unwrap().is_empty());

    let files = store.get_files_for_change(change.row_id).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0.name, "hello.txt");
    assert_eq!(files[0].1.encoding, Encoding::Utf8);

    store
        .remove_file_from_change(change.row_id, file_id)
        .await
        .unwrap();
    let unreachable = store.get_unreachable_files().await.unwrap();
    assert_eq!(unreachable, vec!["deadbeef".to_string()]);

    let deleted = store.delete_unreachable_files().await.unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(store.count_files().await.unwrap(), 0);
}

#[tokio::test]
async fn copy_change_files_copies_associations_to_new_change() {
    let (store, _dir) = open_store().await;
    let repo = store.create_repository("acme", true).await.unwrap();
    let parent = store
        .create_change(repo.id, None, Some("alice".to_string()), vec![])
        .await
        .unwrap();
    let ft = FileType::empty();
    let file_id = store
        .upsert_file("a.txt", false, "hash-a", ft)
        .await
        .unwrap();
    store
        .add_file_to_change(parent.row_id, file_id)
        .await
        .unwrap();

    let child = store
        .create_change(
            repo.id,
            None,
            Some("alice".to_string()),
            vec![parent.change_id.clone()],
        )
        .await
        .unwrap();
    store
        .copy_change_files(parent.row_id, child.row_id)
        .await
        .unwrap();

    let files = store.get_files_for_change(child.row_id).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0.name, "a.txt");
}
