//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the catalog and the backend

use crate::services::resource_service::ResourceService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use uuid::Uuid;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct CheckResult {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    catalog: CheckResult,
    backend: CheckResult,
}

/// `GET /healthz`
///
/// Cheap liveness probe; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe:
/// 1. Runs a lightweight query against the catalog (`SELECT 1`).
/// 2. Probes the storage backend with an existence check on a key that
///    should not exist — either answer proves the backend responds.
///
/// HTTP 200 when both checks pass, 503 otherwise.
pub async fn readyz(State(service): State<ResourceService>) -> impl IntoResponse {
    let catalog = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*service.db)
        .await
    {
        Ok(1) => CheckResult {
            ok: true,
            detail: None,
        },
        Ok(other) => CheckResult {
            ok: false,
            detail: Some(format!("unexpected result: {}", other)),
        },
        Err(err) => CheckResult {
            ok: false,
            detail: Some(format!("error: {}", err)),
        },
    };

    let probe = format!("/.readyz-{}", Uuid::new_v4());
    let backend = match service.backend.is_exists(&probe).await {
        Ok(_) => CheckResult {
            ok: true,
            detail: None,
        },
        Err(err) => CheckResult {
            ok: false,
            detail: Some(format!("error: {}", err)),
        },
    };

    let ready = catalog.ok && backend.ok;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            status: if ready { "ready".into() } else { "unavailable".into() },
            catalog,
            backend,
        }),
    )
}
