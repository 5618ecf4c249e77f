//! Error taxonomy for the reporting pipeline.
//!
//! `ReportError` is the library-level error carried through the platform
//! client, the assembler, the renderers and the stores. `ApiError` is the
//! HTTP-facing projection used by `routes/*`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

// ---

pub type Result<T, E = ReportError> = std::result::Result<T, E>;

/// Failure classes a caller can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Connectivity,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported entity type: {0}")]
    UnsupportedEntityType(String),

    #[error("Platform unreachable: {0}")]
    Connectivity(String),

    #[error("Platform returned {status}: {message}")]
    Platform { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReportError {
    // ---
    pub fn kind(&self) -> ErrorKind {
        // ---
        match self {
            ReportError::Validation(_) | ReportError::UnsupportedEntityType(_) => {
                ErrorKind::Validation
            }
            ReportError::Connectivity(_) => ErrorKind::Connectivity,
            ReportError::NotFound(_) => ErrorKind::NotFound,
            ReportError::Platform { .. }
            | ReportError::Render(_)
            | ReportError::Storage(_)
            | ReportError::Io(_)
            | ReportError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn render<E: std::fmt::Display>(err: E) -> Self {
        ReportError::Render(err.to_string())
    }
}

impl From<tera::Error> for ReportError {
    fn from(err: tera::Error) -> Self {
        // tera keeps the useful part of the message in the source chain
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        ReportError::Render(message)
    }
}

// ---

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream unavailable: {0}")]
    BadGateway(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let (status, error_code, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::BadGateway(msg) => {
                tracing::warn!("Upstream platform error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "platform_unreachable",
                    "Telemetry platform is unreachable".into(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal error during report generation".into(),
                )
            }
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        // ---
        match err.kind() {
            ErrorKind::Validation => ApiError::Validation(err.to_string()),
            ErrorKind::Connectivity => ApiError::BadGateway(err.to_string()),
            ErrorKind::NotFound => ApiError::NotFound(err.to_string()),
            ErrorKind::Internal => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_kind_mapping() {
        // ---
        assert_eq!(
            ReportError::UnsupportedEntityType("building".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ReportError::Connectivity("refused".into()).kind(),
            ErrorKind::Connectivity
        );
        assert_eq!(
            ReportError::Platform {
                status: 500,
                message: "boom".into()
            }
            .kind(),
            ErrorKind::Internal
        );
        assert_eq!(ReportError::Render("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_api_status_codes() {
        // ---
        let resp = ApiError::from(ReportError::UnsupportedEntityType("x".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ApiError::from(ReportError::Connectivity("down".into())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let resp = ApiError::from(ReportError::NotFound("rpt-1".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = ApiError::from(ReportError::Render("bad template".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
