//! Background reclamation of backend bytes owned by soft-deleted rows.
//!
//! Delete operations only flip catalog status; the bytes stay behind.
//! When enabled, this task periodically sweeps tombstones older than a
//! configured age and removes their backend objects, tolerating objects
//! that are already gone. Rows are never removed: re-sweeping an
//! already-reclaimed tombstone is a cheap existence probe.

use crate::config::ReclaimConfig;
use crate::errors::ServiceResult;
use crate::models::resource::ResourceStatus;
use crate::storage::{StorageBackend, StorageError, path};
use chrono::Utc;
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time};
use tracing::{debug, warn};

/// Tombstones swept per pass.
const SWEEP_BATCH: i64 = 100;

pub struct Reclaimer {
    db: Arc<SqlitePool>,
    backend: Arc<dyn StorageBackend>,
    cfg: ReclaimConfig,
}

impl Reclaimer {
    pub fn new(db: Arc<SqlitePool>, backend: Arc<dyn StorageBackend>, cfg: ReclaimConfig) -> Self {
        Self { db, backend, cfg }
    }

    /// Run the sweep loop until the process exits.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_secs(self.cfg.interval_secs.max(1)));
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(0) => {}
                    Ok(reclaimed) => debug!(reclaimed, "reclaim sweep finished"),
                    Err(err) => warn!(error = %err, "reclaim sweep failed"),
                }
            }
        })
    }

    /// One pass: remove the backend objects of tombstones older than
    /// `min_age_secs`. Returns how many objects were removed.
    pub async fn sweep(&self) -> ServiceResult<usize> {
        let cutoff = Utc::now().timestamp() - self.cfg.min_age_secs as i64;
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT resource_id, space_id FROM resource \
             WHERE status = ? AND updated <= ? LIMIT ?",
        )
        .bind(ResourceStatus::Deleted)
        .bind(cutoff)
        .bind(SWEEP_BATCH)
        .fetch_all(&*self.db)
        .await?;

        let mut reclaimed = 0;
        for (resource_id, space_id) in rows {
            let object = path::resource_path(&space_id, &resource_id);
            match self.backend.is_exists(&object).await {
                Ok(false) => continue,
                Ok(true) => match self.backend.remove(&object).await {
                    Ok(()) | Err(StorageError::NotFound(_)) => {
                        debug!(%resource_id, "reclaimed deleted resource body");
                        reclaimed += 1;
                    }
                    Err(err) => warn!(%resource_id, error = %err, "failed to reclaim body"),
                },
                Err(err) => warn!(%resource_id, error = %err, "failed to probe body"),
            }
        }
        Ok(reclaimed)
    }
}
