//! Error handling module
//!
//! HTTP-facing error type; export failures are mapped onto status codes here.

use crate::export::ExportError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Export(e) => match e {
                ExportError::RecordNotFound { .. } => (StatusCode::NOT_FOUND, "RECORD_NOT_FOUND"),
                ExportError::Schema(_) => (StatusCode::UNPROCESSABLE_ENTITY, "SCHEMA_ERROR"),
                ExportError::DependencyFailed { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "DEPENDENCY_FAILED")
                }
                ExportError::DepthExceeded { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "DEPTH_EXCEEDED")
                }
                ExportError::Connection(_) => (StatusCode::BAD_GATEWAY, "CONNECTION_ERROR"),
                ExportError::DeadlineExceeded => (StatusCode::GATEWAY_TIMEOUT, "DEADLINE_EXCEEDED"),
                ExportError::Serialization(_) | ExportError::Io(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR")
                }
            },
            AppError::Database(_) => (StatusCode::BAD_GATEWAY, "DATABASE_ERROR"),
            AppError::Connection(_) => (StatusCode::BAD_GATEWAY, "CONNECTION_ERROR"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Config(_) => (StatusCode::BAD_REQUEST, "CONFIG_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }

        let body = Json(ErrorResponse {
            success: false,
            message: self.to_string(),
            error: match &self {
                AppError::Export(e) => Some(e.to_string()),
                AppError::Database(e) => Some(e.to_string()),
                _ => None,
            },
            code: Some(code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_errors_map_to_statuses() {
        let not_found = AppError::from(ExportError::RecordNotFound {
            table: "users".into(),
            column: "id".into(),
            id: "1".into(),
        });
        assert_eq!(not_found.into_response().status(), StatusCode::NOT_FOUND);

        let schema = AppError::from(ExportError::Schema("no primary key".into()));
        assert_eq!(schema.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let down = AppError::from(ExportError::Connection("refused".into()));
        assert_eq!(down.into_response().status(), StatusCode::BAD_GATEWAY);

        let slow = AppError::from(ExportError::DeadlineExceeded);
        assert_eq!(slow.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_validation_error() {
        let err = validation_error("table is required");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
