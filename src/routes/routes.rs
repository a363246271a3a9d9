//! Route wiring for the resource operations.
//!
//! - **Streaming**
//!   - `POST /v1/resources` — upload (framed request body)
//!   - `PUT  /v1/resources` — re-upload (framed request body; the header
//!     frame names the target resource)
//!   - `GET  /v1/resources/{resource_id}/content` — download (framed
//!     response body)
//!
//! - **Unary**
//!   - `GET    /v1/resources` — list
//!   - `GET    /v1/resources/{resource_id}` — describe
//!   - `PATCH  /v1/resources/{resource_id}` — update metadata
//!   - `DELETE /v1/resources` — delete resources
//!   - `DELETE /v1/workspaces` — delete workspaces

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        resource_handlers::{
            delete_resources, delete_workspaces, describe_file, download_file, list_resources,
            re_upload_file, update_resource, upload_file,
        },
    },
    services::resource_service::ResourceService,
};
use axum::{
    Router,
    routing::{delete, get},
};

/// Build the router; shared state (`ResourceService`) flows to every
/// handler.
pub fn routes() -> Router<ResourceService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // resource operations
        .route(
            "/v1/resources",
            get(list_resources)
                .post(upload_file)
                .put(re_upload_file)
                .delete(delete_resources),
        )
        .route(
            "/v1/resources/{resource_id}",
            get(describe_file).patch(update_resource),
        )
        .route("/v1/resources/{resource_id}/content", get(download_file))
        // workspace operations
        .route("/v1/workspaces", delete(delete_workspaces))
}
