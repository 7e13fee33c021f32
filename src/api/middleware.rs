use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::api::common::{error_response, ApiError};
use crate::crypto::verify_api_key;
use crate::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Guards `/internal` routes. Open when no internal key is configured.
pub async fn require_internal_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.internal_api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            error_response(StatusCode::UNAUTHORIZED, "Missing API key", "UNAUTHORIZED")
        })?;

    let valid = verify_api_key(presented, expected, state.config.hmac_secret.as_deref())
        .map_err(|e| {
            tracing::error!(error = ?e, "Failed to verify API key");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to verify API key",
                "INTERNAL_ERROR",
            )
        })?;

    if !valid {
        tracing::warn!(path = %request.uri().path(), "Rejected internal request with bad API key");
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Invalid API key",
            "UNAUTHORIZED",
        ));
    }

    Ok(next.run(request).await)
}
