use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::api::common::{
    bad_request, database, error_response, internal_error, not_found, ApiError, ErrorResponse,
};
use crate::credentials::clean_account_id;
use crate::db::logs::{LogQuery, LogStats};
use crate::db::models::{LogEntry, LogSummary, NewLogEntry};
use crate::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetLogsQuery {
    /// Entries to skip (default: 0)
    skip: Option<i64>,
    /// Maximum entries to return, 1 to 1000 (default: 100)
    limit: Option<i64>,
    prefix: Option<String>,
    account_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogsResponse {
    pub logs: Vec<LogSummary>,
    pub skip: i64,
    pub limit: i64,
    /// A full page came back; the next page starts at `skip + limit`
    pub has_more: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogPrefixesResponse {
    pub prefixes: Vec<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LogStatsQuery {
    prefix: Option<String>,
    account_id: Option<String>,
}

/// One entry or a list of entries
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum IngestLogsRequest {
    Many(Vec<NewLogEntry>),
    One(NewLogEntry),
}

impl IngestLogsRequest {
    fn into_entries(self) -> Vec<NewLogEntry> {
        match self {
            IngestLogsRequest::Many(entries) => entries,
            IngestLogsRequest::One(entry) => vec![entry],
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestLogsResponse {
    pub inserted: usize,
    pub ids: Vec<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/v1/logs",
    tag = "Logs",
    params(GetLogsQuery),
    responses(
        (status = 200, description = "Log entries, newest first", body = LogsResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GetLogsQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let query = LogQuery::new(params.skip, params.limit, params.prefix, params.account_id);

    let db = database(&state).await?;
    let logs = db
        .get_logs(&query)
        .await
        .map_err(|e| internal_error("Failed to fetch logs", e))?;

    Ok(Json(LogsResponse {
        has_more: logs.len() as i64 == query.limit,
        logs,
        skip: query.skip,
        limit: query.limit,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/logs/prefixes",
    tag = "Logs",
    responses(
        (status = 200, description = "Distinct prefixes seen in logs", body = LogPrefixesResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_log_prefixes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LogPrefixesResponse>, ApiError> {
    let db = database(&state).await?;

    let prefixes = db
        .get_unique_prefixes()
        .await
        .map_err(|e| internal_error("Failed to fetch log prefixes", e))?;

    Ok(Json(LogPrefixesResponse { prefixes }))
}

#[utoipa::path(
    get,
    path = "/api/v1/logs/stats",
    tag = "Logs",
    params(LogStatsQuery),
    responses(
        (status = 200, description = "Log statistics for a prefix", body = LogStats),
        (status = 400, description = "Prefix is required", body = ErrorResponse),
        (status = 500, description = "Failed to fetch logs statistics", body = ErrorResponse)
    )
)]
pub async fn get_log_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogStatsQuery>,
) -> Result<Json<LogStats>, ApiError> {
    let Some(prefix) = params.prefix.filter(|p| !p.trim().is_empty()) else {
        return Err(bad_request("Prefix is required"));
    };

    let stats = match state.connections.database().await {
        Ok(db) => db.get_log_stats(&prefix, params.account_id.as_deref()).await,
        Err(e) => Err(e),
    };

    stats
        .map(Json)
        .map_err(|e| internal_error("Failed to fetch logs statistics", e))
}

#[utoipa::path(
    get,
    path = "/api/v1/logs/{log_id}",
    tag = "Logs",
    params(
        ("log_id" = String, Path, description = "Log entry ID")
    ),
    responses(
        (status = 200, description = "Log entry with metadata", body = LogEntry),
        (status = 400, description = "Invalid log id", body = ErrorResponse),
        (status = 404, description = "Log not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_log(
    State(state): State<Arc<AppState>>,
    Path(log_id): Path<String>,
) -> Result<Json<LogEntry>, ApiError> {
    let log_id = Uuid::parse_str(log_id.trim()).map_err(|_| bad_request("Invalid log id"))?;

    let db = database(&state).await?;
    let log = db
        .get_log(&log_id)
        .await
        .map_err(|e| internal_error("Failed to fetch log", e))?
        .ok_or_else(|| not_found("Log not found"))?;

    Ok(Json(log))
}

#[utoipa::path(
    post,
    path = "/internal/logs",
    tag = "Internal",
    request_body = IngestLogsRequest,
    responses(
        (status = 201, description = "Entries stored", body = IngestLogsResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Invalid API key", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn ingest_logs(
    State(state): State<Arc<AppState>>,
    Json(body): Json<IngestLogsRequest>,
) -> Result<(StatusCode, Json<IngestLogsResponse>), ApiError> {
    let mut entries = body.into_entries();
    if entries.is_empty() {
        return Err(bad_request("No log entries provided"));
    }
    if entries.iter().any(|e| e.message.trim().is_empty()) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Log message must not be empty",
            "INVALID_LOG",
        ));
    }

    for entry in &mut entries {
        entry.account_id = entry
            .account_id
            .as_deref()
            .map(clean_account_id)
            .filter(|id| !id.is_empty());
    }

    let db = database(&state).await?;
    let ids = db
        .insert_logs(&entries)
        .await
        .map_err(|e| internal_error("Failed to store logs", e))?;

    tracing::debug!(count = ids.len(), "Log entries ingested");

    Ok((
        StatusCode::CREATED,
        Json(IngestLogsResponse {
            inserted: ids.len(),
            ids,
        }),
    ))
}
