use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

/// Failure of the time-series store behind the degree-day engine.
///
/// Never turned into a default value: callers either propagate it or log it.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[allow(dead_code)] // Constructed by the in-memory store in tests
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A reading rejected at the ingestion boundary.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IngestError {
    #[error("expected 3 fields (serial,timestamp,value), got {0}")]
    FieldCount(usize),

    #[error("sensor serial is empty")]
    EmptySerial,

    #[error("invalid timestamp '{0}', expected YYYY-MM-DD HH:MM:SS")]
    Timestamp(String),

    #[error("invalid temperature '{0}'")]
    Value(String),

    #[error("CSV decode error: {0}")]
    Csv(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ExternalServiceError(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal database error".to_string(),
                )
            }
            AppError::Storage(err) => {
                tracing::error!("Storage error: {:?}", err);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Degree-day store unavailable".to_string(),
                )
            }
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}
