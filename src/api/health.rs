use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    /// `up` while a live connection is held, `down` otherwise
    database: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = if state.connections.is_live().await {
        "up"
    } else {
        "down"
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        database: database.to_string(),
    })
}
