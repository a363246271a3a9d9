//! HTTP handlers for the resource operations.
//! Streaming bodies carry length-delimited frames; unary operations are
//! plain JSON. Handlers stay thin: decode, delegate to `ResourceService`,
//! encode.

use crate::{
    errors::{ServiceError, ServiceResult},
    services::resource_service::{ListRequest, ResourceService, UpdateRequest, UploadReply},
    transfer::frame::{Frame, FrameCodec},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::io;
use tokio_util::{codec::FramedRead, io::StreamReader};

#[derive(Debug, Deserialize)]
pub struct DeleteResourcesBody {
    #[serde(default)]
    pub resource_ids: Vec<String>,
    #[serde(default)]
    pub space_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteWorkspacesBody {
    #[serde(default)]
    pub space_ids: Vec<String>,
}

/// Decode a request body into a stream of frames.
fn decode_frames(body: Body) -> impl Stream<Item = ServiceResult<Frame>> + Send + Unpin + 'static {
    let reader = StreamReader::new(
        body.into_data_stream()
            .map(|chunk| chunk.map_err(io::Error::other)),
    );
    FramedRead::new(reader, FrameCodec).map(|frame| frame.map_err(ServiceError::from))
}

/// `POST /v1/resources` — create a resource from an upload stream.
pub async fn upload_file(
    State(service): State<ResourceService>,
    body: Body,
) -> Result<Json<UploadReply>, ServiceError> {
    let reply = service.upload_file(decode_frames(body)).await?;
    Ok(Json(reply))
}

/// `PUT /v1/resources` — replace a resource body in place; the header
/// frame names the target.
pub async fn re_upload_file(
    State(service): State<ResourceService>,
    body: Body,
) -> Result<StatusCode, ServiceError> {
    service.re_upload_file(decode_frames(body)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /v1/resources/{resource_id}/content` — stream a resource body as
/// a metadata frame followed by data frames.
pub async fn download_file(
    State(service): State<ResourceService>,
    Path(resource_id): Path<String>,
) -> Result<Response, ServiceError> {
    let (_, frames) = service.download_file(&resource_id).await?;

    let mut response = Response::new(Body::from_stream(frames));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    Ok(response)
}

/// `GET /v1/resources/{resource_id}` — resource metadata.
pub async fn describe_file(
    State(service): State<ResourceService>,
    Path(resource_id): Path<String>,
) -> Result<Response, ServiceError> {
    let resource = service.describe_file(&resource_id).await?;
    Ok(Json(resource).into_response())
}

/// `GET /v1/resources` — list/filter the resources of one workspace.
pub async fn list_resources(
    State(service): State<ResourceService>,
    Query(req): Query<ListRequest>,
) -> Result<Response, ServiceError> {
    let reply = service.list_resources(req).await?;
    Ok(Json(reply).into_response())
}

/// `PATCH /v1/resources/{resource_id}` — metadata-only update.
pub async fn update_resource(
    State(service): State<ResourceService>,
    Path(resource_id): Path<String>,
    Json(mut req): Json<UpdateRequest>,
) -> Result<StatusCode, ServiceError> {
    req.resource_id = resource_id;
    service.update_resource(req).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /v1/resources` — soft-delete resources of one workspace.
pub async fn delete_resources(
    State(service): State<ResourceService>,
    Json(req): Json<DeleteResourcesBody>,
) -> Result<StatusCode, ServiceError> {
    service
        .delete_resources(&req.resource_ids, &req.space_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /v1/workspaces` — soft-delete every resource of the listed
/// workspaces.
pub async fn delete_workspaces(
    State(service): State<ResourceService>,
    Json(req): Json<DeleteWorkspacesBody>,
) -> Result<StatusCode, ServiceError> {
    service.delete_workspaces(&req.space_ids).await?;
    Ok(StatusCode::NO_CONTENT)
}
