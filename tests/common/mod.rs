//! Shared harness for the integration tests: a service wired to a scratch
//! SQLite catalog and a DFS backend rooted in a tempdir, plus frame
//! helpers for driving the streaming operations.

#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, stream};
use resource_store::{
    catalog,
    errors::{ServiceError, ServiceResult},
    services::resource_service::{ResourceService, UploadReply},
    storage::dfs::DfsBackend,
    transfer::frame::{DownloadMeta, Frame, FrameCodec, UploadHeader},
};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::codec::Decoder;

pub struct TestEnv {
    pub service: ResourceService,
    /// Owns the catalog database and the backend root for the test's
    /// lifetime.
    pub dir: TempDir,
}

pub async fn setup() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();

    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("catalog.db"))
        .create_if_missing(true);
    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .unwrap(),
    );
    catalog::run_migrations(&db).await.unwrap();

    let objects_root = dir.path().join("objects");
    std::fs::create_dir_all(&objects_root).unwrap();
    let backend = Arc::new(DfsBackend::new(objects_root));

    TestEnv {
        service: ResourceService::new(db, backend),
        dir,
    }
}

impl TestEnv {
    /// File names currently present under a workspace's backend prefix.
    pub fn workspace_files(&self, space_id: &str) -> Vec<String> {
        let dir = self.dir.path().join("objects").join(space_id);
        let mut names = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

/// Build an upload stream: one header frame followed by data frames.
pub fn frames<H: Serialize>(
    header: &H,
    chunks: &[&[u8]],
) -> impl Stream<Item = ServiceResult<Frame>> + Send + Unpin + 'static {
    let mut items: Vec<ServiceResult<Frame>> = vec![Ok(Frame::with_meta(header).unwrap())];
    for chunk in chunks {
        items.push(Ok(Frame::data(Bytes::copy_from_slice(chunk))));
    }
    stream::iter(items)
}

/// An upload stream that fails mid-body, the way a dropped client
/// connection surfaces.
pub fn interrupted_frames<H: Serialize>(
    header: &H,
    first_chunk: &[u8],
) -> impl Stream<Item = ServiceResult<Frame>> + Send + Unpin + 'static {
    stream::iter(vec![
        Ok(Frame::with_meta(header).unwrap()),
        Ok(Frame::data(Bytes::copy_from_slice(first_chunk))),
        Err(ServiceError::Internal("connection reset by client".into())),
    ])
}

pub fn upload_header(space_id: &str, name: &str, resource_type: i32, size: i64) -> UploadHeader {
    UploadHeader {
        space_id: space_id.into(),
        resource_name: name.into(),
        resource_type,
        size,
        description: String::new(),
        created_by: "tester".into(),
    }
}

/// Upload `data` as one body frame.
pub async fn upload(
    service: &ResourceService,
    space_id: &str,
    name: &str,
    resource_type: i32,
    data: &[u8],
) -> ServiceResult<UploadReply> {
    let header = upload_header(space_id, name, resource_type, data.len() as i64);
    service.upload_file(frames(&header, &[data])).await
}

/// Download a resource and decode its frames back into metadata + bytes.
pub async fn download(service: &ResourceService, resource_id: &str) -> (DownloadMeta, Vec<u8>) {
    let (_, mut body) = service.download_file(resource_id).await.unwrap();

    let mut wire = BytesMut::new();
    while let Some(chunk) = body.next().await {
        wire.extend_from_slice(&chunk.unwrap());
    }

    let mut codec = FrameCodec;
    let meta_frame = codec.decode(&mut wire).unwrap().expect("metadata frame");
    let meta: DownloadMeta = meta_frame.decode_meta().unwrap();
    assert!(meta_frame.data.is_empty());

    let mut data = Vec::new();
    while let Some(frame) = codec.decode(&mut wire).unwrap() {
        assert!(frame.meta.is_none(), "unexpected metadata frame in body");
        data.extend_from_slice(&frame.data);
    }
    assert!(wire.is_empty(), "trailing bytes after the last frame");
    (meta, data)
}
