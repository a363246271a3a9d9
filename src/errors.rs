//! Service-level error taxonomy and its HTTP mapping.
//!
//! Clients only ever see one of the typed kinds below; underlying causes
//! (database, I/O, backend SDK) are logged server-side and collapsed into
//! `internal error` on the wire.

use crate::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::io;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A request argument failed validation; carries the offending field.
    #[error("invalid parameter `{0}`")]
    InvalidParams(String),

    /// The requested resource does not exist (or is soft-deleted).
    #[error("resource `{0}` not exists")]
    ResourceNotExists(String),

    /// A non-deleted resource with the same (space, type, name) exists.
    #[error("resource already exists")]
    ResourceAlreadyExists,

    /// A malformed transfer stream: missing header, data in the header
    /// frame, stray metadata frames, or a declared/received size mismatch.
    #[error("{0}")]
    Protocol(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParams(_) => StatusCode::BAD_REQUEST,
            Self::ResourceNotExists(_) => StatusCode::NOT_FOUND,
            Self::ResourceAlreadyExists => StatusCode::CONFLICT,
            Self::Storage(StorageError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message exposed on the wire. Anything mapped to 5xx is collapsed
    /// so backend and database details never leak to clients.
    fn public_message(&self) -> String {
        match self {
            Self::InvalidParams(_)
            | Self::ResourceNotExists(_)
            | Self::ResourceAlreadyExists => self.to_string(),
            Self::Storage(StorageError::Unavailable(_)) => "storage backend unavailable".into(),
            _ => "internal error".into(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        let body = Json(json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}
