//! Centralized application configuration.
//! Combines environment variables (prefix `RESOURCE_STORE_`) and CLI
//! arguments; CLI wins. Backend-specific keys are validated at startup and
//! a missing required key aborts the process.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;

pub const STORAGE_BACKGROUND_HDFS: &str = "hdfs";
pub const STORAGE_BACKGROUND_S3: &str = "s3";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub storage: StorageConfig,
    pub reclaim: ReclaimConfig,
}

/// Which storage backend the process binds at startup, plus its settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `hdfs` or `s3`.
    pub background: String,
    pub hdfs: Option<HdfsConfig>,
    pub s3: Option<S3Config>,
}

/// Settings for the HDFS-family backend: the service writes through a
/// mounted distributed filesystem root (NFS gateway or fuse mount).
#[derive(Debug, Clone)]
pub struct HdfsConfig {
    pub mount_dir: String,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint URL; a bare hostname is accepted and gets a scheme derived
    /// from `disable_ssl`.
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub disable_ssl: bool,
    pub force_path_style: bool,
}

impl S3Config {
    /// Endpoint with a scheme, ready for the SDK.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else if self.disable_ssl {
            format!("http://{}", self.endpoint)
        } else {
            format!("https://{}", self.endpoint)
        }
    }
}

/// Background reclamation of storage bytes owned by soft-deleted rows.
/// Disabled by default; rows always stay in the catalog as tombstones.
#[derive(Debug, Clone)]
pub struct ReclaimConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Only rows deleted at least this long ago are swept.
    pub min_age_secs: u64,
}

/// Command-line configuration; every flag overrides its environment
/// counterpart.
#[derive(Parser, Debug)]
#[command(author, version, about = "Resource/file storage service")]
pub struct Args {
    /// Host to bind to (overrides RESOURCE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides RESOURCE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Catalog database URL (overrides RESOURCE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Storage backend, `hdfs` or `s3` (overrides RESOURCE_STORE_STORAGE_BACKGROUND)
    #[arg(long)]
    pub storage_background: Option<String>,

    /// DFS mount root for the hdfs backend (overrides RESOURCE_STORE_HDFS_MOUNT_DIR)
    #[arg(long)]
    pub hdfs_mount_dir: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str) -> Result<bool> {
    match env::var(key) {
        Ok(value) => value
            .parse::<bool>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(_) => Ok(false),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .parse::<u64>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the
    /// migrate flag, then validate the backend selection.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let env_port = match env::var("RESOURCE_STORE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing RESOURCE_STORE_PORT value `{}`", value))?,
            Err(_) => 3000,
        };

        let storage = StorageConfig {
            background: args
                .storage_background
                .or_else(|| env_string("RESOURCE_STORE_STORAGE_BACKGROUND"))
                .unwrap_or_else(|| STORAGE_BACKGROUND_HDFS.into()),
            hdfs: args
                .hdfs_mount_dir
                .or_else(|| env_string("RESOURCE_STORE_HDFS_MOUNT_DIR"))
                .map(|mount_dir| HdfsConfig { mount_dir }),
            s3: Self::s3_from_env()?,
        };

        let reclaim = ReclaimConfig {
            enabled: env_bool("RESOURCE_STORE_RECLAIM_ENABLED")?,
            interval_secs: env_u64("RESOURCE_STORE_RECLAIM_INTERVAL_SECS", 300)?,
            min_age_secs: env_u64("RESOURCE_STORE_RECLAIM_MIN_AGE_SECS", 3600)?,
        };

        let cfg = Self {
            host: args
                .host
                .or_else(|| env_string("RESOURCE_STORE_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            database_url: args
                .database_url
                .or_else(|| env_string("RESOURCE_STORE_DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/resource_store.db".into()),
            storage,
            reclaim,
        };
        cfg.validate()?;

        Ok((cfg, args.migrate))
    }

    fn s3_from_env() -> Result<Option<S3Config>> {
        let endpoint = env_string("RESOURCE_STORE_S3_ENDPOINT");
        let region = env_string("RESOURCE_STORE_S3_REGION");
        let bucket = env_string("RESOURCE_STORE_S3_BUCKET");
        let access_key_id = env_string("RESOURCE_STORE_S3_ACCESS_KEY_ID");
        let secret_access_key = env_string("RESOURCE_STORE_S3_SECRET_ACCESS_KEY");

        if endpoint.is_none()
            && region.is_none()
            && bucket.is_none()
            && access_key_id.is_none()
            && secret_access_key.is_none()
        {
            return Ok(None);
        }

        let require = |value: Option<String>, key: &str| -> Result<String> {
            value.with_context(|| format!("{} must be set when the s3 backend is configured", key))
        };

        Ok(Some(S3Config {
            endpoint: require(endpoint, "RESOURCE_STORE_S3_ENDPOINT")?,
            region: require(region, "RESOURCE_STORE_S3_REGION")?,
            bucket: require(bucket, "RESOURCE_STORE_S3_BUCKET")?,
            access_key_id: require(access_key_id, "RESOURCE_STORE_S3_ACCESS_KEY_ID")?,
            secret_access_key: require(secret_access_key, "RESOURCE_STORE_S3_SECRET_ACCESS_KEY")?,
            disable_ssl: env_bool("RESOURCE_STORE_S3_DISABLE_SSL")?,
            force_path_style: env_bool("RESOURCE_STORE_S3_FORCE_PATH_STYLE")?,
        }))
    }

    /// Reject configurations missing the keys their selected backend needs.
    pub fn validate(&self) -> Result<()> {
        match self.storage.background.as_str() {
            STORAGE_BACKGROUND_HDFS => {
                if self.storage.hdfs.is_none() {
                    bail!("hdfs mount dir must be specified when storage background is hdfs");
                }
            }
            STORAGE_BACKGROUND_S3 => {
                if self.storage.s3.is_none() {
                    bail!("s3 settings must be specified when storage background is s3");
                }
            }
            other => bail!("unsupported storage background `{}`", other),
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
