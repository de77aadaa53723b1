/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

//! Content-addressed, immutable blob storage on the local filesystem.
//!
//! Mirrors the teacher's split between a trait-object-friendly `Blobstore`
//! capability and a concrete filesystem implementation: the `ObjectStore`
//! trait here is the capability other crates (MetaStore-driven push,
//! ChangeEngine, GC) depend on, and [`FsObjectStore`] is the only
//! implementation shipped, matching spec §4.1.

mod error;
mod fs_store;
mod mime;

pub use error::ObjectStoreError;
pub use fs_store::FsObjectStore;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use pogo_types::ContentHash;
use std::pin::Pin;

/// A boxed, owned stream of byte chunks. Using a boxed stream (rather than a
/// generic type parameter) keeps `ObjectStore` object-safe, so the rest of
/// the workspace can hold it as `Arc<dyn ObjectStore>`.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Opens the magic bytes checked at offset 0 to distinguish Zstd-compressed
/// blobs from legacy uncompressed ones, per spec §4.1/§6.2.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Consumes a byte stream, computing its SHA-256 hash while writing
    /// Zstd-compressed bytes to the content-addressed path. A second `put`
    /// of the same bytes is a no-op (content-addressed idempotence).
    async fn put(&self, stream: ByteStream) -> Result<ContentHash, ObjectStoreError>;

    /// Convenience for callers that already have the full content in
    /// memory (tests, small config files).
    async fn put_bytes(&self, data: Bytes) -> Result<ContentHash, ObjectStoreError> {
        let stream: ByteStream = Box::pin(futures::stream::once(async move { Ok(data) }));
        self.put(stream).await
    }

    /// Opens a blob, transparently decompressing it if it is Zstd-framed,
    /// and returning the bytes verbatim otherwise (legacy uncompressed
    /// layout). Also returns a best-effort sniffed MIME type.
    async fn open(&self, hash: &ContentHash) -> Result<(Bytes, Option<String>), ObjectStoreError>;

    /// Removes the blob for `hash`. Safe to call when it is already absent.
    async fn delete(&self, hash: &ContentHash) -> Result<(), ObjectStoreError>;

    async fn exists(&self, hash: &ContentHash) -> Result<bool, ObjectStoreError>;

    /// Enumerates every hash currently present on disk. Used by the GC's
    /// in-memory sweep (spec §4.5.2).
    async fn list_all(&self) -> Result<Vec<ContentHash>, ObjectStoreError>;

    /// Removes empty two-character shard directories left behind by
    /// deletes.
    async fn prune_empty_shards(&self) -> Result<(), ObjectStoreError>;
}
