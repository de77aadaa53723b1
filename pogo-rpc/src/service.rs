/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::pin::Pin;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use changeengine::{ChangeEngine, DiffAlgorithm, EditedFile, FileDiff, PushedFile};
use futures::Stream;
use gc::{GarbageCollector, GcLock};
use metastore::MetaStore;
use slog::{error, info, o, Logger};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

use crate::auth::AuthResolver;
use crate::convert::{diff_algorithm_from_pb, file_status_to_pb, file_type_to_pb, pogo_error_to_status};
use crate::pogo::v1 as pb;
use crate::pogo::v1::pogo_server::Pogo;

/// Chunk size used when streaming file content back to the client (`Edit`,
/// `DiffLocal`'s content requests). Arbitrary but matches the teacher's own
/// streaming chunk sizes in its filestore layer.
const CONTENT_CHUNK_SIZE: usize = 64 * 1024;

/// Adapts the generated `Pogo` service trait onto [`ChangeEngine`] and
/// [`GarbageCollector`]. Mutating RPCs hold a read lease on the process-wide
/// GC lock for their duration (spec.md §5); `ChangeEngine` itself does not
/// know about the lock.
pub struct PogoHandler {
    engine: Arc<ChangeEngine>,
    meta: Arc<MetaStore>,
    gc: Arc<GarbageCollector>,
    gc_lock: GcLock,
    auth: Arc<dyn AuthResolver>,
    logger: Logger,
}

impl PogoHandler {
    pub fn new(
        engine: Arc<ChangeEngine>,
        meta: Arc<MetaStore>,
        gc: Arc<GarbageCollector>,
        gc_lock: GcLock,
        auth: Arc<dyn AuthResolver>,
        logger: Logger,
    ) -> Self {
        PogoHandler {
            engine,
            meta,
            gc,
            gc_lock,
            auth,
            logger,
        }
    }

    async fn authenticate(&self, token: &str, repository_id: i32) -> Result<String, Status> {
        self.auth
            .resolve(token, repository_id)
            .await
            .map_err(pogo_error_to_status)
    }
}

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

fn chunks_of(data: &[u8], size: usize) -> Vec<Bytes> {
    if data.is_empty() {
        return vec![Bytes::new()];
    }
    data.chunks(size).map(Bytes::copy_from_slice).collect()
}

fn edited_file_to_chunks(file: EditedFile, out: &mut Vec<Result<pb::FileChunk, Status>>) {
    out.push(Ok(pb::FileChunk {
        payload: Some(pb::file_chunk::Payload::FileHeader(pb::FileHeader {
            path: file.name,
            executable: file.executable,
            file_type: Some(file_type_to_pb(file.file_type)),
        })),
    }));
    for chunk in chunks_of(&file.content, CONTENT_CHUNK_SIZE) {
        out.push(Ok(pb::FileChunk {
            payload: Some(pb::file_chunk::Payload::ContentChunk(chunk)),
        }));
    }
    out.push(Ok(pb::FileChunk {
        payload: Some(pb::file_chunk::Payload::Eof(pb::Empty {})),
    }));
}

fn file_diff_to_chunks(diff: FileDiff, out: &mut Vec<Result<pb::DiffChunk, Status>>) {
    out.push(Ok(pb::DiffChunk {
        payload: Some(pb::diff_chunk::Payload::FileHeader(pb::FileHeaderDiff {
            path: diff.path,
            status: file_status_to_pb(diff.status),
        })),
    }));
    if let Some(hunks) = diff.hunks {
        for hunk in hunks {
            out.push(Ok(pb::DiffChunk {
                payload: Some(pb::diff_chunk::Payload::DiffBlock(pb::DiffBlock {
                    header: hunk.header,
                    lines: hunk
                        .lines
                        .into_iter()
                        .map(|(tag, text)| pb::DiffLine {
                            tag: tag.to_string(),
                            text,
                        })
                        .collect(),
                })),
            }));
        }
    }
    out.push(Ok(pb::DiffChunk {
        payload: Some(pb::diff_chunk::Payload::Eof(pb::Empty {})),
    }));
}

/// Reassembles a `PushStart` + interleaved `(FileHeader, content chunks...,
/// Eof)*` + `EndOfFiles` client stream into a `PushStart` and a `Vec<PushedFile>`.
struct PushAssembly {
    start: Option<pb::PushStart>,
    files: Vec<PushedFile>,
    current_header: Option<pb::FileHeader>,
    current_content: BytesMut,
    done: bool,
}

impl PushAssembly {
    fn new() -> Self {
        PushAssembly {
            start: None,
            files: Vec::new(),
            current_header: None,
            current_content: BytesMut::new(),
            done: false,
        }
    }

    fn accept(&mut self, chunk: pb::PushChunk) -> Result<(), Status> {
        match chunk.payload {
            Some(pb::push_chunk::Payload::Start(s)) => self.start = Some(s),
            Some(pb::push_chunk::Payload::FileHeader(h)) => self.current_header = Some(h),
            Some(pb::push_chunk::Payload::FileContentChunk(bytes)) => {
                self.current_content.extend_from_slice(&bytes);
            }
            Some(pb::push_chunk::Payload::Eof(_)) => {
                let header = self
                    .current_header
                    .take()
                    .ok_or_else(|| Status::invalid_argument("eof without a preceding file header"))?;
                self.files.push(PushedFile {
                    name: header.path,
                    executable: header.executable,
                    content: self.current_content.split().freeze(),
                });
            }
            Some(pb::push_chunk::Payload::EndOfFiles(_)) => self.done = true,
            None => return Err(Status::invalid_argument("empty push chunk")),
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl Pogo for PogoHandler {
    async fn init(
        &self,
        request: Request<pb::InitRequest>,
    ) -> Result<Response<pb::InitResponse>, Status> {
        let req = request.into_inner();
        // Init has no repository yet to scope the auth check against;
        // resolution here only needs to prove the token is valid at all.
        self.authenticate(&req.auth_token, 0).await?;
        let (repo, root) = self
            .engine
            .init(&req.repo_name, req.public)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        Ok(Response::new(pb::InitResponse {
            repo_id: repo.id,
            initial_change_id: root.change_id,
        }))
    }

    type PushFullStream = ReceiverStream<Result<pb::PushAck, Status>>;

    async fn push_full(
        &self,
        request: Request<Streaming<pb::PushChunk>>,
    ) -> Result<Response<Self::PushFullStream>, Status> {
        let mut inbound = request.into_inner();
        let mut assembly = PushAssembly::new();
        while !assembly.done {
            match inbound.message().await? {
                Some(chunk) => assembly.accept(chunk)?,
                None => break,
            }
        }
        let start = assembly
            .start
            .ok_or_else(|| Status::invalid_argument("push stream missing its start message"))?;

        let caller = self.authenticate(&start.auth_token, start.repo_id).await?;
        let _lease = self.gc_lock.acquire_read().await;

        let log = self.logger.new(o!("rpc" => "push_full", "repo" => start.repo_id));
        let result = self
            .engine
            .push(
                start.repo_id,
                &start.change_id,
                &caller,
                assembly.files,
                start.force,
            )
            .await;

        let (tx, rx) = mpsc::channel(1);
        match result {
            Ok(()) => {
                info!(log, "push complete"; "change" => &start.change_id);
                let _ = tx
                    .send(Ok(pb::PushAck {
                        change_id: start.change_id,
                        has_conflicts: false,
                        conflicting_paths: Vec::new(),
                    }))
                    .await;
            }
            Err(e) => {
                error!(log, "push failed"; "error" => %e);
                let _ = tx.send(Err(pogo_error_to_status(e.into()))).await;
            }
        }
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn new_change(
        &self,
        request: Request<pb::NewChangeRequest>,
    ) -> Result<Response<pb::NewChangeResponse>, Status> {
        let req = request.into_inner();
        let caller = self.authenticate(&req.auth_token, req.repo_id).await?;
        let _lease = self.gc_lock.acquire_read().await;

        let mut parent_queries = req.parent_names;
        if parent_queries.is_empty() {
            parent_queries.push(req.current_change);
        }

        let change = self
            .engine
            .new_change(req.repo_id, req.description, caller, parent_queries)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;

        Ok(Response::new(pb::NewChangeResponse {
            change_id: change.change_id.clone(),
            change_name: change.change_id,
        }))
    }

    type EditStream = ResponseStream<pb::FileChunk>;

    async fn edit(
        &self,
        request: Request<pb::EditRequest>,
    ) -> Result<Response<Self::EditStream>, Status> {
        let req = request.into_inner();
        self.authenticate(&req.auth_token, req.repo_id).await?;
        let _lease = self.gc_lock.acquire_read().await;

        let change = self
            .engine
            .resolve(req.repo_id, &req.revision)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        let files = self
            .engine
            .edit(change.row_id)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;

        let mut out = Vec::new();
        for file in files {
            edited_file_to_chunks(file, &mut out);
        }
        Ok(Response::new(Box::pin(futures::stream::iter(out))))
    }

    async fn set_bookmark(
        &self,
        request: Request<pb::SetBookmarkRequest>,
    ) -> Result<Response<pb::Empty>, Status> {
        let req = request.into_inner();
        self.authenticate(&req.auth_token, req.repo_id).await?;
        let _lease = self.gc_lock.acquire_read().await;

        let change_row_id = match req.change {
            Some(query) => {
                self.engine
                    .resolve(req.repo_id, &query)
                    .await
                    .map_err(|e| pogo_error_to_status(e.into()))?
                    .row_id
            }
            None => {
                return Err(Status::invalid_argument(
                    "set_bookmark requires a target change",
                ))
            }
        };
        self.engine
            .set_bookmark(req.repo_id, &req.name, change_row_id)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        Ok(Response::new(pb::Empty {}))
    }

    async fn remove_bookmark(
        &self,
        request: Request<pb::RemoveBookmarkRequest>,
    ) -> Result<Response<pb::Empty>, Status> {
        let req = request.into_inner();
        self.authenticate(&req.auth_token, req.repo_id).await?;
        let _lease = self.gc_lock.acquire_read().await;

        self.engine
            .remove_bookmark(req.repo_id, &req.name)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        Ok(Response::new(pb::Empty {}))
    }

    async fn list_bookmarks(
        &self,
        request: Request<pb::ListBookmarksRequest>,
    ) -> Result<Response<pb::ListBookmarksResponse>, Status> {
        let req = request.into_inner();
        self.authenticate(&req.auth_token, req.repo_id).await?;

        let bookmarks = self
            .engine
            .list_bookmarks(req.repo_id)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        Ok(Response::new(pb::ListBookmarksResponse {
            bookmarks: bookmarks
                .into_iter()
                .map(|(name, change)| pb::Bookmark {
                    name,
                    change_id: change.change_id,
                })
                .collect(),
        }))
    }

    async fn info(
        &self,
        request: Request<pb::InfoRequest>,
    ) -> Result<Response<pb::InfoResponse>, Status> {
        let req = request.into_inner();
        self.authenticate(&req.auth_token, req.repo_id).await?;

        let change = self
            .meta
            .get_change(req.repo_id, &req.change_id)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        let parents = self
            .meta
            .get_change_parents(change.row_id)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        let bookmarks = self
            .meta
            .get_change_bookmarks(change.row_id)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;

        Ok(Response::new(pb::InfoResponse {
            change_name: change.change_id,
            description: change.description,
            author: change.author,
            parents: parents.into_iter().map(|p| p.change_id).collect(),
            bookmarks,
        }))
    }

    type LogStream = ResponseStream<pb::ChangeSummary>;

    async fn log(
        &self,
        request: Request<pb::LogRequest>,
    ) -> Result<Response<Self::LogStream>, Status> {
        let req = request.into_inner();
        self.authenticate(&req.auth_token, req.repo_id).await?;

        let changes = self
            .meta
            .list_changes(req.repo_id)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;

        let mut out = Vec::with_capacity(changes.len());
        for change in changes {
            let parents = self
                .meta
                .get_change_parents(change.row_id)
                .await
                .map_err(|e| pogo_error_to_status(e.into()))?;
            out.push(Ok(pb::ChangeSummary {
                change_id: change.change_id,
                description: change.description,
                author: change.author,
                parents: parents.into_iter().map(|p| p.change_id).collect(),
            }));
        }
        Ok(Response::new(Box::pin(futures::stream::iter(out))))
    }

    type DiffStream = ResponseStream<pb::DiffChunk>;

    async fn diff(
        &self,
        request: Request<pb::DiffRequest>,
    ) -> Result<Response<Self::DiffStream>, Status> {
        let req = request.into_inner();
        self.authenticate(&req.auth_token, req.repo_id).await?;
        let _lease = self.gc_lock.acquire_read().await;

        let from_query = req
            .rev1
            .or(req.checked_out_change_id.clone())
            .ok_or_else(|| Status::invalid_argument("diff requires rev1 or checked_out_change_id"))?;
        let to_query = req.rev2.unwrap_or_else(|| from_query.clone());

        let from = self
            .engine
            .resolve(req.repo_id, &from_query)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        let to = self
            .engine
            .resolve(req.repo_id, &to_query)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;

        let diffs = self
            .engine
            .diff(
                from.row_id,
                to.row_id,
                diff_algorithm_from_pb(req.algorithm),
                req.allow_large,
            )
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;

        let mut out = Vec::new();
        for diff in diffs {
            file_diff_to_chunks(diff, &mut out);
        }
        Ok(Response::new(Box::pin(futures::stream::iter(out))))
    }

    type DiffLocalStream = ResponseStream<pb::DiffLocalChunk>;

    /// Reads the client's local file tree to completion, then diffs it
    /// against the named change. Simpler than truly interactive fetch
    /// (there's no round of `FileRequest` messages sent back to the
    /// client), since the client already has every local file in hand and
    /// sending them all up front avoids a request/response ping-pong per
    /// file for what's usually a small working copy.
    async fn diff_local(
        &self,
        request: Request<Streaming<pb::DiffLocalChunk>>,
    ) -> Result<Response<Self::DiffLocalStream>, Status> {
        let mut inbound = request.into_inner();
        let mut start: Option<pb::DiffLocalStart> = None;
        let mut files = Vec::new();
        let mut current_header: Option<pb::FileHeader> = None;
        let mut current_content = BytesMut::new();
        let mut done = false;

        while !done {
            let chunk = match inbound.message().await? {
                Some(c) => c,
                None => break,
            };
            match chunk.payload {
                Some(pb::diff_local_chunk::Payload::Start(s)) => start = Some(s),
                Some(pb::diff_local_chunk::Payload::LocalFileHeader(h)) => current_header = Some(h),
                Some(pb::diff_local_chunk::Payload::LocalFileContentChunk(bytes)) => {
                    current_content.extend_from_slice(&bytes);
                }
                Some(pb::diff_local_chunk::Payload::LocalEof(_)) => {
                    let header = current_header.take().ok_or_else(|| {
                        Status::invalid_argument("local_eof without a preceding file header")
                    })?;
                    files.push(PushedFile {
                        name: header.path,
                        executable: header.executable,
                        content: current_content.split().freeze(),
                    });
                }
                Some(pb::diff_local_chunk::Payload::LocalEndOfFiles(_)) => done = true,
                _ => {}
            }
        }

        let start = start
            .ok_or_else(|| Status::invalid_argument("diff_local stream missing its start message"))?;
        self.authenticate(&start.auth_token, start.repo_id).await?;
        let _lease = self.gc_lock.acquire_read().await;

        let change = self
            .engine
            .resolve(start.repo_id, &start.against_change)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        let diffs = self
            .engine
            .diff_local(change.row_id, files, DiffAlgorithm::Myers, false)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;

        let mut out = Vec::new();
        for diff in diffs {
            out.push(Ok(pb::DiffLocalChunk {
                payload: Some(pb::diff_local_chunk::Payload::DiffFileHeader(
                    pb::FileHeaderDiff {
                        path: diff.path,
                        status: file_status_to_pb(diff.status),
                    },
                )),
            }));
            if let Some(hunks) = diff.hunks {
                for hunk in hunks {
                    out.push(Ok(pb::DiffLocalChunk {
                        payload: Some(pb::diff_local_chunk::Payload::DiffBlock(pb::DiffBlock {
                            header: hunk.header,
                            lines: hunk
                                .lines
                                .into_iter()
                                .map(|(tag, text)| pb::DiffLine {
                                    tag: tag.to_string(),
                                    text,
                                })
                                .collect(),
                        })),
                    }));
                }
            }
        }
        out.push(Ok(pb::DiffLocalChunk {
            payload: Some(pb::diff_local_chunk::Payload::DiffEof(pb::Empty {})),
        }));
        Ok(Response::new(Box::pin(futures::stream::iter(out))))
    }

    async fn rm(&self, request: Request<pb::RmRequest>) -> Result<Response<pb::Empty>, Status> {
        let req = request.into_inner();
        let caller = self.authenticate(&req.auth_token, req.repo_id).await?;
        let _lease = self.gc_lock.acquire_read().await;

        self.engine
            .rm(req.repo_id, &req.change, &caller, false)
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        Ok(Response::new(pb::Empty {}))
    }

    async fn garbage_collect(
        &self,
        request: Request<pb::GarbageCollectRequest>,
    ) -> Result<Response<pb::GarbageCollectResponse>, Status> {
        let req = request.into_inner();
        // GarbageCollect is not scoped to a repository; any validly
        // authenticated caller may trigger it.
        self.authenticate(&req.auth_token, 0).await?;

        let report = self
            .gc
            .run()
            .await
            .map_err(|e| pogo_error_to_status(e.into()))?;
        Ok(Response::new(pb::GarbageCollectResponse {
            deleted_db_files: report.deleted_db_files as u64,
            deleted_disk_files: report.deleted_disk_files as u64,
            bytes_freed: report.bytes_freed,
            deleted_ci_runs: report.deleted_ci_runs as u64,
        }))
    }
}
