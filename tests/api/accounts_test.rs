// HTTP tests for the internal account routes
use axum::http::StatusCode;
use serde_json::json;

use fleet_dashboard::credentials::parse_batch;

use crate::api::{json_request, send, setup_test_app};
use crate::common::{create_test_prefix, unique_auth_key, unique_prefix};

#[tokio::test]
async fn test_status_null_clears_error() {
    let Some((app, db)) = setup_test_app().await else {
        return;
    };
    let (_, accounts) = create_test_prefix(&db, 1).await;
    let uri = format!("/internal/accounts/{}/status", accounts[0].account_id);

    let (status, body) = send(
        &app,
        json_request("PUT", &uri, json!({ "error": "SESSION_REVOKED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "errored");

    let (status, body) = send(&app, json_request("PUT", &uri, json!({ "error": null }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "in_progress");
    assert_eq!(body["error"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_derived_registration_cannot_take_an_original_id() {
    let Some((app, db)) = setup_test_app().await else {
        return;
    };
    let (_, parents) = create_test_prefix(&db, 1).await;

    // Short auth keys give originals ids that a derived account could use
    let short_key = format!("orig{}", &unique_auth_key()[..12]);
    let original = parse_batch(&format!("{short_key}:3"))
        .expect("Batch must parse")
        .accounts
        .remove(0);
    let original_prefix = unique_prefix();
    db.create_accounts(std::slice::from_ref(&original), &original_prefix)
        .await
        .expect("Failed to create account");

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/internal/accounts/{}/derived", parents[0].account_id),
            json!({
                "account_id": original.account_id,
                "auth_key": "replacement",
                "dc_id": 5,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_type"], "CONFLICT");

    let stored = db
        .get_account_by_id(&original.account_id)
        .await
        .expect("Failed to get account")
        .expect("Account should exist");
    assert_eq!(stored.auth_key, short_key);
    assert_eq!(stored.dc_id, 3);
    assert_eq!(stored.prefix, original_prefix);
    assert_eq!(stored.parent_account_id, None);
}
