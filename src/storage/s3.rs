//! S3-family driver.
//!
//! Keys are flat: the leading `/` of a service key is stripped everywhere
//! so written keys and listed prefixes agree. Directories do not exist,
//! `remove_all` is a paged list-and-batch-delete, and `rename` is
//! copy-then-delete (atomic to observers as long as the destination did
//! not previously exist).

use super::{ByteReader, StorageBackend, StorageError, StorageResult};
use crate::config::S3Config;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    operation::get_object::GetObjectError,
    operation::head_object::HeadObjectError,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier},
};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

/// Bodies at least this large go through a multipart upload; smaller ones
/// are a single `PutObject`.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Page size for prefix listings during `remove_all`.
const LIST_PAGE_SIZE: i32 = 100;

pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    pub async fn connect(cfg: &S3Config) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(cfg.endpoint_url())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                cfg.access_key_id.clone(),
                cfg.secret_access_key.clone(),
                None,
                None,
                "static",
            ))
            .load()
            .await;
        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(cfg.force_path_style)
            .build();
        Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
        }
    }

    /// Object keys never carry the leading `/` of service keys.
    fn key(name: &str) -> &str {
        name.trim_start_matches('/')
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        if let Err(err) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!(key, "s3: abort multipart upload failed: {}", DisplayErrorContext(&err));
        }
    }
}

fn sdk_err<E>(err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            StorageError::Unavailable(detail)
        }
        _ => StorageError::Backend(detail),
    }
}

fn build_err(err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(err.to_string())
}

/// ETags come back wrapped in quotes.
fn unquote_etag(etag: Option<&str>) -> StorageResult<String> {
    etag.map(|tag| tag.trim_matches('"').to_string())
        .ok_or_else(|| StorageError::Backend("no ETag in s3 response".into()))
}

/// Read up to one part worth of bytes from `reader`.
async fn read_part(reader: &mut (dyn AsyncRead + Send + Unpin)) -> StorageResult<BytesMut> {
    let mut part = BytesMut::new();
    let mut buf = [0u8; 64 * 1024];
    while part.len() < PART_SIZE {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        part.extend_from_slice(&buf[..n]);
    }
    Ok(part)
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn mkdir_all(&self, _dirname: &str) -> StorageResult<()> {
        // Object stores have no directories.
        Ok(())
    }

    async fn is_exists(&self, name: &str) -> StorageResult<bool> {
        debug!(name, "s3: check file is exists");
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(Self::key(name))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(HeadObjectError::is_not_found)
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(sdk_err(err))
                }
            }
        }
    }

    async fn create_and_write(
        &self,
        name: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<String> {
        debug!(name, "s3: create new file for write");
        let key = Self::key(name).to_string();

        let first = read_part(reader).await?;
        if first.len() < PART_SIZE {
            let output = self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(ByteStream::from(first.freeze()))
                .send()
                .await
                .map_err(sdk_err)?;
            return unquote_etag(output.e_tag());
        }

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(sdk_err)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::Backend("no upload id in s3 response".into()))?
            .to_string();

        let mut parts = Vec::new();
        let mut part = first;
        let mut part_number = 1i32;
        loop {
            let uploaded = match self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(&key)
                .upload_id(&upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part.freeze()))
                .send()
                .await
            {
                Ok(uploaded) => uploaded,
                Err(err) => {
                    self.abort_multipart(&key, &upload_id).await;
                    return Err(sdk_err(err));
                }
            };
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );

            part = match read_part(reader).await {
                Ok(part) => part,
                Err(err) => {
                    self.abort_multipart(&key, &upload_id).await;
                    return Err(err);
                }
            };
            if part.is_empty() {
                break;
            }
            part_number += 1;
        }

        let completed = match self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
        {
            Ok(completed) => completed,
            Err(err) => {
                self.abort_multipart(&key, &upload_id).await;
                return Err(sdk_err(err));
            }
        };
        unquote_etag(completed.e_tag())
    }

    async fn open_for_read(&self, name: &str) -> StorageResult<ByteReader> {
        debug!(name, "s3: open file for read");
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(Self::key(name))
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .map(GetObjectError::is_no_such_key)
                    .unwrap_or(false)
                {
                    StorageError::NotFound(name.to_string())
                } else {
                    sdk_err(err)
                }
            })?;
        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn remove(&self, name: &str) -> StorageResult<()> {
        debug!(name, "s3: remove file");
        // DeleteObject succeeds for absent keys; only transport/service
        // failures surface.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(Self::key(name))
            .send()
            .await
            .map_err(sdk_err)?;
        Ok(())
    }

    async fn remove_all(&self, name: &str) -> StorageResult<()> {
        debug!(name, "s3: remove dir and all children");
        let prefix = Self::key(name).to_string();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .max_keys(LIST_PAGE_SIZE)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(sdk_err)?;

            let objects = page
                .contents()
                .iter()
                .filter_map(|object| object.key())
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(build_err)?;
            if !objects.is_empty() {
                let delete = Delete::builder()
                    .set_objects(Some(objects))
                    .build()
                    .map_err(build_err)?;
                self.client
                    .delete_objects()
                    .bucket(&self.bucket)
                    .delete(delete)
                    .send()
                    .await
                    .map_err(sdk_err)?;
            }

            if page.is_truncated() == Some(true) {
                continuation = page.next_continuation_token().map(str::to_string);
            } else {
                return Ok(());
            }
        }
    }

    async fn rename(&self, old: &str, new: &str) -> StorageResult<()> {
        debug!(old, new, "s3: rename file");
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, Self::key(old)))
            .key(Self::key(new))
            .send()
            .await
            .map_err(sdk_err)?;
        self.remove(old).await
    }
}
