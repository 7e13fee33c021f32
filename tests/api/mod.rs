// HTTP integration tests module
pub mod accounts_test;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use fleet_dashboard::{api::router, AppState, Config, Database};

use crate::common::setup_test_db;

/// The full router backed by the test database, plus a direct handle for
/// arranging data. `None` when TEST_DATABASE_URL is not set.
pub async fn setup_test_app() -> Option<(Router, Database)> {
    let db = setup_test_db().await?;
    let database_url = std::env::var("TEST_DATABASE_URL").ok()?;

    let mut config = Config::from_env();
    config.database_url = database_url;
    config.reconnect_max_attempts = 1;
    config.internal_api_key = None;

    Some((router(Arc::new(AppState::new(config))), db))
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("Router must answer");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}
