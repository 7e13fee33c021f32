use axum::{http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{AppState, Database};

/// Standard error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
    /// Machine-readable error type code
    pub error_type: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, error: impl Into<String>, error_type: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            error_type: error_type.to_string(),
        }),
    )
}

pub fn bad_request(error: impl Into<String>) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, error, "BAD_REQUEST")
}

pub fn not_found(error: impl Into<String>) -> ApiError {
    error_response(StatusCode::NOT_FOUND, error, "NOT_FOUND")
}

/// Log `err` and answer 500 with a generic `message`.
pub fn internal_error(message: &str, err: anyhow::Error) -> ApiError {
    tracing::error!(error = ?err, "{}", message);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_ERROR")
}

/// A live database for the current request. Fails with 503 when the
/// connection manager gives up.
pub async fn database(state: &AppState) -> Result<Database, ApiError> {
    state.connections.database().await.map_err(|e| {
        tracing::error!(error = ?e, "Database unavailable");
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Database unavailable",
            "DATABASE_UNAVAILABLE",
        )
    })
}
