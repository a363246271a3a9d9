//! HDFS-family driver.
//!
//! Writes through a mounted distributed filesystem root (NFS gateway or
//! fuse mount), so directories are real and `rename` is native. The first
//! write into a workspace fails with a typed not-found until the workspace
//! directory exists; the transfer engine recovers with `mkdir_all` and a
//! single retry.

use super::{ByteReader, StorageBackend, StorageError, StorageResult};
use async_trait::async_trait;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
};
use tracing::debug;

/// Read granularity for digesting and forwarding bytes.
const READ_BUF_SIZE: usize = 4096;

pub struct DfsBackend {
    root: PathBuf,
}

impl DfsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a service key (always `/`-prefixed) under the mount root.
    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name.trim_start_matches('/'))
    }

    async fn discard_partial(path: &Path) {
        if let Err(err) = fs::remove_file(path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!("failed to discard partial file {}: {}", path.display(), err);
            }
        }
    }
}

#[async_trait]
impl StorageBackend for DfsBackend {
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn mkdir_all(&self, dirname: &str) -> StorageResult<()> {
        debug!(dirname, "dfs: create directory recursively");
        fs::create_dir_all(self.resolve(dirname)).await?;
        Ok(())
    }

    async fn is_exists(&self, name: &str) -> StorageResult<bool> {
        match fs::metadata(self.resolve(name)).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn create_and_write(
        &self,
        name: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> StorageResult<String> {
        debug!(name, "dfs: create new file for write");
        let path = self.resolve(name);
        let mut file = match File::create(&path).await {
            Ok(file) => file,
            // Missing workspace directory; no byte was consumed yet.
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let mut digest = md5::Context::new();
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    drop(file);
                    Self::discard_partial(&path).await;
                    return Err(err.into());
                }
            };
            digest.consume(&buf[..n]);
            if let Err(err) = file.write_all(&buf[..n]).await {
                drop(file);
                Self::discard_partial(&path).await;
                return Err(err.into());
            }
        }

        // The write is durable before the caller may commit metadata.
        if let Err(err) = async {
            file.flush().await?;
            file.sync_all().await
        }
        .await
        {
            drop(file);
            Self::discard_partial(&path).await;
            return Err(err.into());
        }

        Ok(format!("{:x}", digest.compute()))
    }

    async fn open_for_read(&self, name: &str) -> StorageResult<ByteReader> {
        debug!(name, "dfs: open file for read");
        let file = File::open(self.resolve(name)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::Io(err)
            }
        })?;
        Ok(Box::pin(file))
    }

    async fn remove(&self, name: &str) -> StorageResult<()> {
        debug!(name, "dfs: remove file");
        fs::remove_file(self.resolve(name)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::Io(err)
            }
        })
    }

    async fn remove_all(&self, name: &str) -> StorageResult<()> {
        debug!(name, "dfs: remove dir and all children");
        match fs::remove_dir_all(self.resolve(name)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn rename(&self, old: &str, new: &str) -> StorageResult<()> {
        debug!(old, new, "dfs: rename file");
        fs::rename(self.resolve(old), self.resolve(new))
            .await
            .map_err(|err| {
                if err.kind() == ErrorKind::NotFound {
                    StorageError::NotFound(old.to_string())
                } else {
                    StorageError::Io(err)
                }
            })
    }
}
