use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::common::{
    bad_request, database, error_response, internal_error, not_found, ApiError, ErrorResponse,
};
use crate::credentials::{clean_account_id, ACCOUNT_ID_LEN};
use crate::db::accounts::DerivedAccountConflict;
use crate::db::models::{Account, AccountState, AccountStatusPatch, NewAccount};
use crate::AppState;

/// An account together with its computed state
#[derive(Debug, Serialize, ToSchema)]
pub struct AccountResponse {
    #[serde(flatten)]
    pub account: Account,
    pub state: AccountState,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        let state = account.state();
        Self { account, state }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckAccountsRequest {
    pub account_ids: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckAccountsResponse {
    /// Ids from the request that are already stored
    pub existing: Vec<String>,
}

/// A derived account reported by the automation process
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterDerivedRequest {
    pub account_id: String,
    pub auth_key: String,
    pub dc_id: i32,
}

#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account_id}",
    tag = "Accounts",
    params(
        ("account_id" = String, Path, description = "Account ID")
    ),
    responses(
        (status = 200, description = "Account", body = AccountResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let db = database(&state).await?;

    let account = db
        .get_account_by_id(&clean_account_id(&account_id))
        .await
        .map_err(|e| internal_error("Failed to fetch account", e))?
        .ok_or_else(|| not_found("Account not found"))?;

    Ok(Json(account.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/accounts/check",
    tag = "Accounts",
    request_body = CheckAccountsRequest,
    responses(
        (status = 200, description = "Ids already stored", body = CheckAccountsResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn check_accounts(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckAccountsRequest>,
) -> Result<Json<CheckAccountsResponse>, ApiError> {
    let db = database(&state).await?;

    let existing = db
        .check_existing_accounts(&body.account_ids)
        .await
        .map_err(|e| internal_error("Failed to check accounts", e))?;

    Ok(Json(CheckAccountsResponse { existing }))
}

#[utoipa::path(
    put,
    path = "/internal/accounts/{account_id}/status",
    tag = "Internal",
    request_body = AccountStatusPatch,
    params(
        ("account_id" = String, Path, description = "Account ID")
    ),
    responses(
        (status = 200, description = "Updated account", body = AccountResponse),
        (status = 401, description = "Invalid API key", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn update_account_status(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Json(patch): Json<AccountStatusPatch>,
) -> Result<Json<AccountResponse>, ApiError> {
    let db = database(&state).await?;
    let account_id = clean_account_id(&account_id);

    let account = db
        .update_account_status(&account_id, &patch)
        .await
        .map_err(|e| internal_error("Failed to update account", e))?
        .ok_or_else(|| not_found("Account not found"))?;

    tracing::info!(
        account_id = %account.account_id,
        state = ?account.state(),
        "Account status updated"
    );

    Ok(Json(account.into()))
}

#[utoipa::path(
    post,
    path = "/internal/accounts/{account_id}/derived",
    tag = "Internal",
    request_body = RegisterDerivedRequest,
    params(
        ("account_id" = String, Path, description = "Parent account ID")
    ),
    responses(
        (status = 201, description = "Derived account", body = AccountResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Invalid API key", body = ErrorResponse),
        (status = 404, description = "Parent account not found", body = ErrorResponse),
        (status = 409, description = "Account id taken by another account", body = ErrorResponse),
        (status = 422, description = "Derived account id has the original id length", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn register_derived_account(
    State(state): State<Arc<AppState>>,
    Path(parent_id): Path<String>,
    Json(body): Json<RegisterDerivedRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let parent_id = clean_account_id(&parent_id);
    let account_id = clean_account_id(&body.account_id);

    if account_id.is_empty() || body.auth_key.trim().is_empty() {
        return Err(bad_request("account_id and auth_key are required"));
    }
    if account_id == parent_id {
        return Err(bad_request("A derived account cannot be its own parent"));
    }
    if account_id.len() == ACCOUNT_ID_LEN {
        // The log filter treats full-length ids as originals.
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Derived account ids must not be {ACCOUNT_ID_LEN} characters long"),
            "INVALID_ACCOUNT_ID",
        ));
    }

    let db = database(&state).await?;
    let derived = NewAccount {
        account_id,
        auth_key: body.auth_key.trim().to_string(),
        dc_id: body.dc_id,
    };

    let account = db
        .register_derived_account(&parent_id, &derived)
        .await
        .map_err(|e| match e.downcast_ref::<DerivedAccountConflict>() {
            Some(conflict) => {
                error_response(StatusCode::CONFLICT, conflict.to_string(), "CONFLICT")
            }
            None => internal_error("Failed to register derived account", e),
        })?
        .ok_or_else(|| not_found("Parent account not found"))?;

    tracing::info!(
        account_id = %account.account_id,
        parent_account_id = %parent_id,
        prefix = %account.prefix,
        "Derived account registered"
    );

    Ok((StatusCode::CREATED, Json(account.into())))
}
