//! The streaming transfer engine.
//!
//! Bridges the push-style wire stream (frames arriving) and the pull-style
//! backend writer (`create_and_write` takes a reader) with a bounded
//! in-process pipe: a spawned producer task pumps frame payloads into the
//! write end while the backend drains the read end. The pipe's capacity is
//! the backpressure window from client through server to backend.
//!
//! Every failure path removes the partially-written object before the
//! error is returned, so no orphan survives a failed or cancelled
//! transfer. Both tasks are joined before the caller can reply.

pub mod frame;

use crate::errors::{ServiceError, ServiceResult};
use crate::storage::{ByteReader, StorageBackend, StorageError};
use bytes::Bytes;
use frame::{DigestTrailer, Frame};
use futures::{Stream, StreamExt, future, stream};
use std::io;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::io::ReaderStream;
use tracing::warn;

/// Read granularity for download framing.
pub const DATA_BUF_SIZE: usize = 4096;

/// Capacity of the pipe between the frame producer and the backend writer.
const PIPE_CAPACITY: usize = 64 * 1024;

/// What the producer saw before end-of-stream.
struct StreamTally {
    received: u64,
    trailer_md5: Option<String>,
}

/// Stream the body frames of `frames` into `object_path`.
///
/// Handles the missing-workspace retry (`mkdir_all` + one more attempt;
/// the driver reports that case before consuming any byte), verifies the
/// received byte count against `declared_size`, verifies the client md5
/// trailer when one was sent, and removes the object on every failure.
/// Returns the backend-computed digest.
pub async fn write_stream<S>(
    backend: &dyn StorageBackend,
    workspace_dir: &str,
    object_path: &str,
    declared_size: i64,
    frames: S,
) -> ServiceResult<String>
where
    S: Stream<Item = ServiceResult<Frame>> + Send + Unpin + 'static,
{
    let (mut read_half, write_half) = tokio::io::duplex(PIPE_CAPACITY);
    let producer = tokio::spawn(drain_frames(frames, write_half));

    let written = match backend.create_and_write(object_path, &mut read_half).await {
        Err(StorageError::NotFound(_)) => match backend.mkdir_all(workspace_dir).await {
            Ok(()) => backend.create_and_write(object_path, &mut read_half).await,
            Err(err) => Err(err),
        },
        other => other,
    };
    // If the backend bailed out early the producer is still blocked on the
    // pipe; dropping the read end fails its next write.
    drop(read_half);

    let tally = match producer.await {
        Ok(tally) => tally,
        Err(err) => Err(ServiceError::Internal(format!(
            "upload producer task failed: {err}"
        ))),
    };

    // The backend's own error wins over the pipe error it induced.
    let etag = match written {
        Ok(etag) => etag,
        Err(err) => return Err(rollback(backend, object_path, err.into()).await),
    };
    let tally = match tally {
        Ok(tally) => tally,
        Err(err) => return Err(rollback(backend, object_path, err).await),
    };

    if tally.received != declared_size as u64 {
        let err = ServiceError::Protocol(format!(
            "file data lose: declared {} bytes, received {}",
            declared_size, tally.received
        ));
        return Err(rollback(backend, object_path, err).await);
    }
    if let Some(md5) = tally.trailer_md5 {
        if md5 != etag {
            let err = ServiceError::Protocol(format!(
                "content digest mismatch: client sent {md5}, backend computed {etag}"
            ));
            return Err(rollback(backend, object_path, err).await);
        }
    }

    Ok(etag)
}

/// Remove the partial object and hand the original error back.
async fn rollback(backend: &dyn StorageBackend, object_path: &str, err: ServiceError) -> ServiceError {
    match backend.remove(object_path).await {
        Ok(()) | Err(StorageError::NotFound(_)) => {}
        Err(remove_err) => {
            warn!(path = object_path, error = %remove_err, "failed to remove partial object");
        }
    }
    err
}

/// Producer half: forward every data frame into the pipe, counting bytes,
/// and capture the optional digest trailer. Closes the pipe at
/// end-of-stream so the backend writer observes EOF.
async fn drain_frames<S>(mut frames: S, mut sink: DuplexStream) -> ServiceResult<StreamTally>
where
    S: Stream<Item = ServiceResult<Frame>> + Send + Unpin,
{
    let mut tally = StreamTally {
        received: 0,
        trailer_md5: None,
    };
    while let Some(next) = frames.next().await {
        let frame = next?;
        if frame.meta.is_some() {
            // Metadata after the header frame can only be the trailer.
            if tally.trailer_md5.is_some() {
                return Err(ServiceError::Protocol(
                    "more than one trailer frame in upload stream".into(),
                ));
            }
            if !frame.data.is_empty() {
                return Err(ServiceError::Protocol("trailer frame carries data".into()));
            }
            let trailer: DigestTrailer = frame.decode_meta()?;
            tally.trailer_md5 = Some(trailer.md5);
            continue;
        }
        tally.received += frame.data.len() as u64;
        sink.write_all(&frame.data).await?;
    }
    let _ = sink.shutdown().await;
    Ok(tally)
}

/// Frame a download: one metadata frame, then one data frame per non-empty
/// read. A dropped response body drops the reader with it, which aborts
/// the backend read.
pub fn encode_download(
    meta: Frame,
    reader: ByteReader,
) -> impl Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static {
    let head = stream::once(future::ready(frame::encode_frame(meta)));
    let body = ReaderStream::with_capacity(reader, DATA_BUF_SIZE)
        .map(|chunk| chunk.and_then(|data| frame::encode_frame(Frame::data(data))));
    head.chain(body)
}
