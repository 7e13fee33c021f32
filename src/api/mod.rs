pub mod accounts;
pub mod common;
pub mod health;
pub mod logs;
pub mod middleware;
pub mod prefixes;

pub use health::health;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::AppState;

/// All API routes. Layers that depend on deployment (CORS, docs, body
/// limit) are added by the binary.
pub fn router(state: Arc<AppState>) -> Router {
    let internal = Router::new()
        .route(
            "/internal/accounts/:account_id/status",
            put(accounts::update_account_status),
        )
        .route(
            "/internal/accounts/:account_id/derived",
            post(accounts::register_derived_account),
        )
        .route("/internal/logs", post(logs::ingest_logs))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::require_internal_key,
        ));

    Router::new()
        .route("/health", get(health))
        // Accounts
        .route("/api/v1/accounts/check", post(accounts::check_accounts))
        .route("/api/v1/accounts/:account_id", get(accounts::get_account))
        // Prefixes
        .route(
            "/api/v1/prefixes",
            get(prefixes::get_prefixes).post(prefixes::create_prefix),
        )
        .route(
            "/api/v1/prefixes/overview",
            get(prefixes::get_prefixes_overview),
        )
        .route(
            "/api/v1/prefixes/validate",
            post(prefixes::validate_accounts),
        )
        .route(
            "/api/v1/prefixes/generate",
            get(prefixes::generate_prefix_name),
        )
        // Logs
        .route("/api/v1/logs", get(logs::get_logs))
        .route("/api/v1/logs/prefixes", get(logs::get_log_prefixes))
        .route("/api/v1/logs/stats", get(logs::get_log_stats))
        .route("/api/v1/logs/:log_id", get(logs::get_log))
        .merge(internal)
        .with_state(state)
}
