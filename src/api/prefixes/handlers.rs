use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::api::common::{
    bad_request, database, error_response, internal_error, ApiError, ErrorResponse,
};
use crate::credentials::{generate_prefix, parse_batch, plan_batch, BatchError, ValidationReport};
use crate::db::prefixes::PrefixExists;
use crate::db::{Database, Prefix};
use crate::stats::{GlobalStats, PrefixStats};
use crate::AppState;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize, IntoParams)]
pub struct OverviewQuery {
    /// 1-based page number (default: 1)
    page: Option<i64>,
    /// Prefixes per page (default: 10)
    page_size: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PrefixOverview {
    pub prefix: Prefix,
    pub stats: PrefixStats,
    /// Percent of original accounts with a stable, unbanned derived account
    pub stable_rate: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OverviewResponse {
    pub prefixes: Vec<PrefixOverview>,
    pub global_stats: GlobalStats,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateRequest {
    /// Raw `authKey:dcId` lines separated by newlines
    pub accounts: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePrefixRequest {
    /// Generated when absent
    pub prefix: Option<String>,
    pub description: String,
    /// Raw `authKey:dcId` lines separated by newlines
    pub accounts: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatePrefixResponse {
    pub prefix: Prefix,
    pub added: u64,
    pub skipped: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GeneratedPrefixResponse {
    pub prefix: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/prefixes",
    tag = "Prefixes",
    responses(
        (status = 200, description = "All prefixes, newest first", body = Vec<Prefix>),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_prefixes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Prefix>>, ApiError> {
    let db = database(&state).await?;

    let prefixes = db
        .get_all_prefixes()
        .await
        .map_err(|e| internal_error("Failed to fetch prefixes", e))?;

    Ok(Json(prefixes))
}

#[utoipa::path(
    get,
    path = "/api/v1/prefixes/overview",
    tag = "Prefixes",
    params(OverviewQuery),
    responses(
        (status = 200, description = "A page of prefixes with account statistics", body = OverviewResponse),
        (status = 400, description = "Page out of range", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_prefixes_overview(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OverviewQuery>,
) -> Result<Json<OverviewResponse>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = page_offset(page, page_size).ok_or_else(|| bad_request("Page out of range"))?;

    let db = database(&state).await?;
    let overview = build_overview(&db, offset, page, page_size)
        .await
        .map_err(|e| internal_error("Failed to fetch prefixes overview", e))?;

    Ok(Json(overview))
}

/// Rows to skip before `page`. `None` when the offset does not fit in an `i64`.
pub fn page_offset(page: i64, page_size: i64) -> Option<i64> {
    page.checked_sub(1)?.checked_mul(page_size)
}

async fn build_overview(
    db: &Database,
    offset: i64,
    page: i64,
    page_size: i64,
) -> anyhow::Result<OverviewResponse> {
    let total = db.count_prefixes().await?;
    let prefixes = db.get_prefixes_page(offset, page_size).await?;

    let names: Vec<String> = prefixes.iter().map(|p| p.prefix.clone()).collect();
    let mut by_prefix: HashMap<String, Vec<_>> = HashMap::new();
    for account in db.get_accounts_by_prefixes(&names).await? {
        by_prefix
            .entry(account.prefix.clone())
            .or_default()
            .push(account);
    }

    let prefixes: Vec<PrefixOverview> = prefixes
        .into_iter()
        .map(|prefix| {
            let stats = by_prefix
                .get(&prefix.prefix)
                .map(|accounts| PrefixStats::from_accounts(accounts))
                .unwrap_or_default();
            PrefixOverview {
                stable_rate: stats.stable_rate(),
                prefix,
                stats,
            }
        })
        .collect();

    let global_stats = GlobalStats::from_prefix_stats(prefixes.iter().map(|p| &p.stats));

    Ok(OverviewResponse {
        prefixes,
        global_stats,
        total,
        page,
        page_size,
    })
}

#[utoipa::path(
    post,
    path = "/api/v1/prefixes/validate",
    tag = "Prefixes",
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Validation summary", body = ValidationReport),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn validate_accounts(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValidateRequest>,
) -> Result<Json<ValidationReport>, ApiError> {
    let parsed = match parse_batch(&body.accounts) {
        Ok(parsed) => parsed,
        Err(e) => return Ok(Json(ValidationReport::from(&e))),
    };

    let db = database(&state).await?;
    let existing = db
        .check_existing_accounts(&parsed.account_ids())
        .await
        .map_err(|e| internal_error("Failed to validate accounts", e))?;

    let report = match plan_batch(parsed, existing) {
        Ok(plan) => plan.report(),
        Err(e) => ValidationReport::from(&e),
    };

    Ok(Json(report))
}

fn batch_error(err: BatchError) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, err.to_string(), "INVALID_ACCOUNTS")
}

#[utoipa::path(
    post,
    path = "/api/v1/prefixes",
    tag = "Prefixes",
    request_body = CreatePrefixRequest,
    responses(
        (status = 201, description = "Prefix created", body = CreatePrefixResponse),
        (status = 400, description = "Invalid request or accounts", body = ErrorResponse),
        (status = 409, description = "Prefix already exists", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_prefix(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePrefixRequest>,
) -> Result<(StatusCode, Json<CreatePrefixResponse>), ApiError> {
    let description = body.description.trim();
    if description.is_empty() {
        return Err(bad_request("Description is required"));
    }

    let prefix = match body.prefix.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => {
            if p.chars().any(char::is_whitespace) {
                return Err(bad_request("Prefix must not contain whitespace"));
            }
            p.to_string()
        }
        _ => generate_prefix(),
    };

    let parsed = parse_batch(&body.accounts).map_err(batch_error)?;

    let db = database(&state).await?;
    let existing = db
        .check_existing_accounts(&parsed.account_ids())
        .await
        .map_err(|e| internal_error("Failed to check existing accounts", e))?;
    let plan = plan_batch(parsed, existing).map_err(batch_error)?;

    let created = db
        .create_prefix(&prefix, description, &plan.accounts)
        .await
        .map_err(|e| match e.downcast_ref::<PrefixExists>() {
            Some(conflict) => {
                error_response(StatusCode::CONFLICT, conflict.to_string(), "CONFLICT")
            }
            None => internal_error("Failed to create prefix", e),
        })?;

    // Accounts inserted concurrently by another batch are skipped too.
    let skipped = plan.total.saturating_sub(created.inserted_accounts as usize);

    Ok((
        StatusCode::CREATED,
        Json(CreatePrefixResponse {
            prefix: created.prefix,
            added: created.inserted_accounts,
            skipped,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/prefixes/generate",
    tag = "Prefixes",
    responses(
        (status = 200, description = "A fresh prefix name", body = GeneratedPrefixResponse)
    )
)]
pub async fn generate_prefix_name() -> Json<GeneratedPrefixResponse> {
    Json(GeneratedPrefixResponse {
        prefix: generate_prefix(),
    })
}
