/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use bytes::Bytes;
use futures::Stream;
use pogo_types::FileType;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::canonical::Canonicalizer;
use crate::error::FileTyperError;
use crate::typeify::Typeifier;

const CHUNK_SIZE: usize = 8 * 1024;

/// Wraps [`Canonicalizer`] around an `AsyncRead` so push handlers can stream
/// ingest bytes straight from the wire without buffering whole files.
pub fn canonicalize_stream<R>(
    reader: R,
    file_type: FileType,
) -> impl Stream<Item = Result<Bytes, FileTyperError>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let canon = Canonicalizer::new(file_type.encoding, file_type.bom, file_type.binary);
    futures::stream::try_unfold(
        State::Reading(reader, canon),
        |state| async move { step(state).await },
    )
}

/// Wraps [`Typeifier`] the same way for `edit`'s egress path.
pub fn type_stream<R>(
    reader: R,
    file_type: FileType,
) -> impl Stream<Item = Result<Bytes, FileTyperError>> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let typeifier = Typeifier::new(
        file_type.encoding,
        file_type.bom,
        file_type.line_ending,
        file_type.binary,
    );
    futures::stream::try_unfold(
        TypeState::Reading(reader, typeifier),
        |state| async move { type_step(state).await },
    )
}

enum State<R> {
    Reading(R, Canonicalizer),
    Done,
}

async fn step<R>(state: State<R>) -> Result<Option<(Bytes, State<R>)>, FileTyperError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    match state {
        State::Done => Ok(None),
        State::Reading(mut reader, mut canon) => {
            let mut buf = vec![0u8; CHUNK_SIZE];
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                let tail = canon.finish();
                if tail.is_empty() {
                    return Ok(None);
                }
                return Ok(Some((Bytes::from(tail), State::Done)));
            }
            let out = canon.push(&buf[..n])?;
            Ok(Some((Bytes::from(out), State::Reading(reader, canon))))
        }
    }
}

enum TypeState<R> {
    Reading(R, Typeifier),
    Done,
}

async fn type_step<R>(
    state: TypeState<R>,
) -> Result<Option<(Bytes, TypeState<R>)>, FileTyperError>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    match state {
        TypeState::Done => Ok(None),
        TypeState::Reading(mut reader, mut typeifier) => {
            let mut buf = vec![0u8; CHUNK_SIZE];
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                let tail = typeifier.finish();
                if tail.is_empty() {
                    return Ok(None);
                }
                return Ok(Some((Bytes::from(tail), TypeState::Done)));
            }
            let out = typeifier.push(&buf[..n])?;
            Ok(Some((Bytes::from(out), TypeState::Reading(reader, typeifier))))
        }
    }
}
