//! Storage backend drivers.
//!
//! A single [`StorageBackend`] instance is bound at startup from
//! configuration and shared by every handler; implementations must be safe
//! for concurrent use. Two drivers exist: [`dfs::DfsBackend`] for
//! HDFS-family mounted filesystems and [`s3::S3Backend`] for S3-compatible
//! object stores.

pub mod dfs;
pub mod path;
pub mod s3;

use crate::config::{STORAGE_BACKGROUND_HDFS, STORAGE_BACKGROUND_S3, StorageConfig};
use async_trait::async_trait;
use std::{io, pin::Pin, sync::Arc};
use thiserror::Error;
use tokio::io::AsyncRead;

/// A lazy byte source handed out by [`StorageBackend::open_for_read`];
/// dropped to release the underlying handle.
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The named object/file is absent. Existence probes never surface
    /// this; they report a boolean instead.
    #[error("`{0}` not found")]
    NotFound(String),

    /// The backend cannot be reached (connection refused, timeout).
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Any other error reported by the backend itself.
    #[error("{0}")]
    Backend(String),
}

/// Uniform file/object operations over the configured backend.
///
/// Semantics differ per driver where object stores force it: directories
/// may be no-ops, recursive deletes may be listing-based, renames may be
/// copy-then-delete. The contracts below are what the transfer engine and
/// facade rely on.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Release pooled connections. Idempotent.
    async fn close(&self) -> StorageResult<()>;

    /// Ensure a directory path exists. May be a no-op on object stores.
    async fn mkdir_all(&self, dirname: &str) -> StorageResult<()>;

    /// Whether `name` is present. Absence is `Ok(false)`, not an error.
    async fn is_exists(&self, name: &str) -> StorageResult<bool>;

    /// Create `name` and stream `reader` into it until end-of-stream, then
    /// flush and close. Returns the content digest (hex md5 on DFS, the
    /// ETag on S3). Failure leaves no observable object.
    ///
    /// A [`StorageError::NotFound`] is reported before any byte of
    /// `reader` is consumed (the parent directory is missing), so callers
    /// may retry once after [`mkdir_all`] with the same reader.
    ///
    /// [`mkdir_all`]: StorageBackend::mkdir_all
    async fn create_and_write(
        &self,
        name: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<String>;

    /// Open `name` for reading.
    async fn open_for_read(&self, name: &str) -> StorageResult<ByteReader>;

    /// Delete a single object/file.
    async fn remove(&self, name: &str) -> StorageResult<()>;

    /// Delete a prefix/subtree. Missing prefixes are not an error.
    async fn remove_all(&self, name: &str) -> StorageResult<()>;

    /// Move `old` to `new`, replacing `new` if present.
    async fn rename(&self, old: &str, new: &str) -> StorageResult<()>;
}

/// Bind the backend selected by configuration. Called once at startup.
pub async fn bind(cfg: &StorageConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match cfg.background.as_str() {
        STORAGE_BACKGROUND_HDFS => {
            let hdfs = cfg
                .hdfs
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("hdfs backend selected without settings"))?;
            Ok(Arc::new(dfs::DfsBackend::new(&hdfs.mount_dir)))
        }
        STORAGE_BACKGROUND_S3 => {
            let s3 = cfg
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("s3 backend selected without settings"))?;
            Ok(Arc::new(s3::S3Backend::connect(s3).await))
        }
        other => anyhow::bail!("unsupported storage background `{}`", other),
    }
}
