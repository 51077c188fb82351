use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{ingest::IngestError, scan::ScanError};

/// API-facing error taxonomy. Responses carry the human-readable message
/// plus a stable `outcome` tag so clients and tests can branch without
/// parsing prose.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("no sensor values in payload")]
    EmptyPayload,
    #[error("authentication required")]
    Unauthorized,
    #[error("interval {0} ms is not an allowed scan interval")]
    InvalidInterval(i64),
    #[error("storage write failed: {0}")]
    Store(#[source] sqlx::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::EmptyPayload | AppError::InvalidInterval(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Store(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            AppError::EmptyPayload => "empty_payload",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidInterval(_) => "invalid_interval",
            AppError::Store(_) => "store_write_failure",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
            "outcome": self.outcome(),
        }));
        (self.status(), body).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::EmptyPayload => AppError::EmptyPayload,
            IngestError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<ScanError> for AppError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::InvalidInterval(ms) => AppError::InvalidInterval(ms),
            ScanError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Store(e)
    }
}
