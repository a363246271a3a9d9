//! ResourceService — one method per catalog operation, orchestrating the
//! catalog, the transfer engine, and the storage backend.
//!
//! The atomicity rule for uploads: the catalog row lands only after the
//! backend has reported the bytes durable, through a single-statement
//! insert that either commits row-and-object together or fails and takes
//! the object with it. Concurrent creators racing on one name are settled
//! by the catalog's partial unique index: exactly one insert wins, the
//! others surface `ResourceAlreadyExists`.

use crate::catalog::{self, ListParams};
use crate::errors::{ServiceError, ServiceResult};
use crate::idgen::IdGenerator;
use crate::models::resource::{Resource, ResourceStatus};
use crate::storage::{StorageBackend, path};
use crate::transfer::{
    self,
    frame::{DownloadMeta, Frame, ReUploadHeader, UploadHeader},
};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::{io, sync::Arc};
use tracing::info;

#[derive(Debug, Serialize)]
pub struct UploadReply {
    pub resource_id: String,
    pub etag: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequest {
    #[serde(default)]
    pub space_id: String,
    #[serde(rename = "type")]
    pub resource_type: Option<i32>,
    pub name: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: Option<String>,
    pub reverse: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ListReply {
    pub infos: Vec<Resource>,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub space_id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<i32>,
    pub description: Option<String>,
}

const DEFAULT_LIST_LIMIT: i64 = 25;
const MAX_LIST_LIMIT: i64 = 1000;

#[derive(Clone)]
pub struct ResourceService {
    /// Shared connection pool for catalog operations.
    pub db: Arc<SqlitePool>,

    /// The one backend driver bound at startup.
    pub backend: Arc<dyn StorageBackend>,

    idgen: IdGenerator,
}

impl ResourceService {
    pub fn new(db: Arc<SqlitePool>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            db,
            backend,
            idgen: IdGenerator::default(),
        }
    }

    /// Create a resource from an upload stream: header frame, body frames,
    /// optional digest trailer. Row and object appear together or not at
    /// all.
    pub async fn upload_file<S>(&self, mut frames: S) -> ServiceResult<UploadReply>
    where
        S: Stream<Item = ServiceResult<Frame>> + Send + Unpin + 'static,
    {
        let header: UploadHeader = expect_header(frames.next().await)?;
        catalog::ensure_space_id(&header.space_id)?;
        if header.size < 0 {
            return Err(ServiceError::InvalidParams("size".into()));
        }
        catalog::ensure_resource_name(&header.resource_name)?;

        if catalog::name_in_use(
            &*self.db,
            &header.space_id,
            header.resource_type,
            &header.resource_name,
            None,
        )
        .await?
        {
            return Err(ServiceError::ResourceAlreadyExists);
        }

        let resource_id = self.idgen.take();
        let workspace = path::workspace_dir(&header.space_id);
        let object = path::resource_path(&header.space_id, &resource_id);
        let etag = transfer::write_stream(
            self.backend.as_ref(),
            &workspace,
            &object,
            header.size,
            frames,
        )
        .await?;

        let now = Utc::now().timestamp();
        let row = Resource {
            resource_id: resource_id.clone(),
            space_id: header.space_id,
            name: header.resource_name,
            resource_type: header.resource_type,
            size: header.size,
            description: header.description,
            created_by: header.created_by,
            status: ResourceStatus::Enabled,
            created: now,
            updated: now,
        };
        // A concurrent creator may have won the name while the body
        // streamed; the partial unique index settles it here.
        if let Err(err) = catalog::insert(&*self.db, &row).await {
            let _ = self.backend.remove(&object).await;
            return Err(err);
        }

        info!(%resource_id, space_id = %row.space_id, size = row.size, "resource uploaded");
        Ok(UploadReply { resource_id, etag })
    }

    /// Replace a resource body in place: stream to a temporary key, then
    /// rename over the live key and record the new size. A failed
    /// re-upload leaves the live object and the row untouched.
    pub async fn re_upload_file<S>(&self, mut frames: S) -> ServiceResult<()>
    where
        S: Stream<Item = ServiceResult<Frame>> + Send + Unpin + 'static,
    {
        let header: ReUploadHeader = expect_header(frames.next().await)?;
        if header.resource_id.is_empty() {
            return Err(ServiceError::InvalidParams("resource_id".into()));
        }
        catalog::ensure_space_id(&header.space_id)?;
        if header.size < 0 {
            return Err(ServiceError::InvalidParams("size".into()));
        }

        let row = catalog::find_in_space(&*self.db, &header.resource_id, &header.space_id).await?;

        let workspace = path::workspace_dir(&row.space_id);
        let live = path::resource_path(&row.space_id, &row.resource_id);
        let temp = path::temp_path(&row.space_id, Utc::now().timestamp());
        transfer::write_stream(
            self.backend.as_ref(),
            &workspace,
            &temp,
            header.size,
            frames,
        )
        .await?;

        if let Err(err) = self.backend.rename(&temp, &live).await {
            let _ = self.backend.remove(&temp).await;
            return Err(err.into());
        }

        let now = Utc::now().timestamp();
        catalog::update_size(&*self.db, &row.resource_id, header.size, now).await?;

        info!(resource_id = %row.resource_id, size = header.size, "resource re-uploaded");
        Ok(())
    }

    /// Open a resource body for download: the caller gets the row plus a
    /// framed byte stream (metadata frame first, then data frames).
    pub async fn download_file(
        &self,
        resource_id: &str,
    ) -> ServiceResult<(Resource, impl Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static)>
    {
        let row = catalog::find_by_id(&*self.db, resource_id).await?;
        let object = path::resource_path(&row.space_id, &row.resource_id);
        let reader = self.backend.open_for_read(&object).await?;
        let meta = Frame::with_meta(&DownloadMeta {
            name: row.name.clone(),
            size: row.size,
        })?;
        Ok((row, transfer::encode_download(meta, reader)))
    }

    pub async fn describe_file(&self, resource_id: &str) -> ServiceResult<Resource> {
        catalog::find_by_id(&*self.db, resource_id).await
    }

    pub async fn list_resources(&self, req: ListRequest) -> ServiceResult<ListReply> {
        catalog::ensure_space_id(&req.space_id)?;
        let sort_by = catalog::sort_column(req.sort_by.as_deref().unwrap_or(""))
            .ok_or_else(|| ServiceError::InvalidParams("sort_by".into()))?;
        let limit = req
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let params = ListParams {
            space_id: req.space_id,
            resource_type: req.resource_type,
            name: req.name,
            search: req.search,
            limit,
            offset: req.offset.unwrap_or(0).max(0),
            sort_by,
            reverse: req.reverse.unwrap_or(false),
        };
        let (infos, total) = catalog::list(&self.db, &params).await?;
        let has_more = infos.len() as i64 >= limit;
        Ok(ListReply {
            infos,
            total,
            has_more,
        })
    }

    /// Metadata-only update; never touches the backend. A rename re-runs
    /// the uniqueness check against its target `(type, name)`.
    pub async fn update_resource(&self, req: UpdateRequest) -> ServiceResult<()> {
        if req.resource_id.is_empty() {
            return Err(ServiceError::InvalidParams("resource_id".into()));
        }
        catalog::ensure_space_id(&req.space_id)?;
        if let Some(name) = req.name.as_deref() {
            catalog::ensure_resource_name(name)?;
        }

        let row = catalog::find_in_space(&*self.db, &req.resource_id, &req.space_id).await?;

        let name = req.name.unwrap_or_else(|| row.name.clone());
        let resource_type = req.resource_type.unwrap_or(row.resource_type);
        let description = req.description.unwrap_or_else(|| row.description.clone());

        if (name.as_str(), resource_type) != (row.name.as_str(), row.resource_type)
            && catalog::name_in_use(
                &*self.db,
                &row.space_id,
                resource_type,
                &name,
                Some(&row.resource_id),
            )
            .await?
        {
            return Err(ServiceError::ResourceAlreadyExists);
        }

        let now = Utc::now().timestamp();
        catalog::update_metadata(
            &*self.db,
            &row.resource_id,
            &row.space_id,
            &name,
            resource_type,
            &description,
            now,
        )
        .await?;
        Ok(())
    }

    /// Soft-delete the listed resources. Backend bytes stay where they
    /// are; the reclaimer sweeps them if enabled.
    pub async fn delete_resources(
        &self,
        resource_ids: &[String],
        space_id: &str,
    ) -> ServiceResult<()> {
        if resource_ids.is_empty() {
            return Err(ServiceError::InvalidParams("resource_ids".into()));
        }
        catalog::ensure_space_id(space_id)?;
        let now = Utc::now().timestamp();
        let deleted = catalog::soft_delete(&self.db, resource_ids, space_id, now).await?;
        info!(space_id, deleted, "resources deleted");
        Ok(())
    }

    /// Soft-delete every resource of the listed workspaces.
    pub async fn delete_workspaces(&self, space_ids: &[String]) -> ServiceResult<()> {
        if space_ids.is_empty() {
            return Err(ServiceError::InvalidParams("space_ids".into()));
        }
        for space_id in space_ids {
            catalog::ensure_space_id(space_id)?;
        }
        let now = Utc::now().timestamp();
        let deleted = catalog::soft_delete_workspaces(&self.db, space_ids, now).await?;
        info!(?space_ids, deleted, "workspaces deleted");
        Ok(())
    }
}

/// Pull the typed header out of the first frame of an upload stream. The
/// header must exist, must parse, and must not smuggle payload bytes.
fn expect_header<T: serde::de::DeserializeOwned>(
    first: Option<ServiceResult<Frame>>,
) -> ServiceResult<T> {
    let frame =
        first.ok_or_else(|| ServiceError::Protocol("stream closed before header frame".into()))??;
    if !frame.data.is_empty() {
        return Err(ServiceError::Protocol("cannot send data in first frame".into()));
    }
    Ok(frame.decode_meta()?)
}
