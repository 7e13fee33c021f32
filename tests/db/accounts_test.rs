// Integration tests for account database operations
use fleet_dashboard::db::accounts::DerivedAccountConflict;
use fleet_dashboard::db::{AccountState, AccountStatusPatch, NewAccount};

use crate::common::{create_test_prefix, new_accounts, setup_test_db, unique_prefix};

#[tokio::test]
async fn test_create_and_check_existing_accounts() {
    let Some(db) = setup_test_db().await else {
        return;
    };

    let accounts = new_accounts(3);
    let prefix = unique_prefix();

    let inserted = db
        .create_accounts(&accounts, &prefix)
        .await
        .expect("Failed to create accounts");
    assert_eq!(inserted, 3);

    // Inserting the same ids again is a no-op
    let inserted = db
        .create_accounts(&accounts[..1], &prefix)
        .await
        .expect("Failed to re-insert accounts");
    assert_eq!(inserted, 0);

    let mut asked: Vec<String> = accounts.iter().map(|a| a.account_id.clone()).collect();
    asked.push("not_stored_anywhere".to_string());
    let mut existing = db
        .check_existing_accounts(&asked)
        .await
        .expect("Failed to check accounts");
    existing.sort();
    asked.pop();
    asked.sort();
    assert_eq!(existing, asked);

    let stored = db
        .get_account_by_id(&accounts[0].account_id)
        .await
        .expect("Failed to get account")
        .expect("Account should exist");
    assert_eq!(stored.prefix, prefix);
    assert_eq!(stored.auth_key, accounts[0].auth_key);
    assert_eq!(stored.dc_id, accounts[0].dc_id);
    assert_eq!(stored.state(), AccountState::InProgress);
}

#[tokio::test]
async fn test_update_account_status_is_partial() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let (_, accounts) = create_test_prefix(&db, 1).await;
    let id = &accounts[0].account_id;

    db.update_account_status(
        id,
        &AccountStatusPatch {
            error: Some(Some("FLOOD_WAIT_420".to_string())),
            external_id: Some(Some("777000".to_string())),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to update status")
    .expect("Account should exist");

    let updated = db
        .update_account_status(
            id,
            &AccountStatusPatch {
                worked_out: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update status")
        .expect("Account should exist");

    assert!(updated.worked_out);
    assert_eq!(updated.error.as_deref(), Some("FLOOD_WAIT_420"));
    assert_eq!(updated.external_id.as_deref(), Some("777000"));
    assert!(!updated.banned);
    assert_eq!(updated.state(), AccountState::Processed);

    let missing = db
        .update_account_status("no_such_account", &AccountStatusPatch::default())
        .await
        .expect("Failed to update status");
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_null_fields_clear_error_and_ban_reason() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let (_, accounts) = create_test_prefix(&db, 1).await;
    let id = &accounts[0].account_id;

    let errored = db
        .update_account_status(
            id,
            &AccountStatusPatch {
                error: Some(Some("AUTH_KEY_UNREGISTERED".to_string())),
                reason: Some(Some("spam".to_string())),
                external_id: Some(Some("42".to_string())),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update status")
        .expect("Account should exist");
    assert_eq!(errored.state(), AccountState::Banned);

    let unbanned = db
        .update_account_status(
            id,
            &AccountStatusPatch {
                reason: Some(None),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update status")
        .expect("Account should exist");
    assert_eq!(unbanned.reason, None);
    assert_eq!(unbanned.state(), AccountState::Errored);

    let cleared = db
        .update_account_status(
            id,
            &AccountStatusPatch {
                error: Some(None),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update status")
        .expect("Account should exist");
    assert_eq!(cleared.error, None);
    assert_eq!(cleared.state(), AccountState::InProgress);
    // Fields left out of the patch keep their value
    assert_eq!(cleared.external_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn test_register_derived_account_joins_parent_prefix() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let (prefix, accounts) = create_test_prefix(&db, 1).await;
    let parent = &accounts[0].account_id;

    let derived = NewAccount {
        account_id: format!("d{}", &parent[..20]),
        auth_key: "derivedkey".to_string(),
        dc_id: 4,
    };

    let account = db
        .register_derived_account(parent, &derived)
        .await
        .expect("Failed to register derived account")
        .expect("Parent should exist");

    assert_eq!(account.prefix, prefix.prefix);
    assert_eq!(account.parent_account_id.as_deref(), Some(parent.as_str()));
    assert_eq!(account.state(), AccountState::Checking);

    let by_prefix = db
        .get_accounts_by_prefix(&prefix.prefix)
        .await
        .expect("Failed to list accounts");
    assert_eq!(by_prefix.len(), 2);

    let orphan = db
        .register_derived_account("no_such_parent", &derived)
        .await
        .expect("Failed to register derived account");
    assert!(orphan.is_none());
}

#[tokio::test]
async fn test_register_derived_account_keeps_other_accounts_intact() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let (_, originals) = create_test_prefix(&db, 1).await;
    let (other_prefix, parents) = create_test_prefix(&db, 1).await;
    let original = &originals[0];
    let parent = &parents[0].account_id;

    // An original id from another prefix
    let hijack = NewAccount {
        account_id: original.account_id.clone(),
        auth_key: "replacement".to_string(),
        dc_id: 5,
    };
    let err = db
        .register_derived_account(parent, &hijack)
        .await
        .expect_err("Taken id must conflict");
    assert!(err.downcast_ref::<DerivedAccountConflict>().is_some());

    let stored = db
        .get_account_by_id(&original.account_id)
        .await
        .expect("Failed to get account")
        .expect("Account should exist");
    assert_eq!(stored.auth_key, original.auth_key);
    assert_eq!(stored.dc_id, original.dc_id);
    assert_eq!(stored.parent_account_id, None);
    assert_ne!(stored.prefix, other_prefix.prefix);

    // Re-registering under the same parent refreshes the credentials
    let derived_id = format!("d{}", &parent[..20]);
    let first = NewAccount {
        account_id: derived_id.clone(),
        auth_key: "firstkey".to_string(),
        dc_id: 1,
    };
    db.register_derived_account(parent, &first)
        .await
        .expect("Failed to register derived account")
        .expect("Parent should exist");
    let refreshed = db
        .register_derived_account(
            parent,
            &NewAccount {
                auth_key: "secondkey".to_string(),
                dc_id: 3,
                ..first.clone()
            },
        )
        .await
        .expect("Failed to register derived account")
        .expect("Parent should exist");
    assert_eq!(refreshed.auth_key, "secondkey");
    assert_eq!(refreshed.dc_id, 3);

    // The same derived id under a different parent is refused
    let err = db
        .register_derived_account(&original.account_id, &first)
        .await
        .expect_err("Derived id of another parent must conflict");
    assert!(err.downcast_ref::<DerivedAccountConflict>().is_some());
}

#[tokio::test]
async fn test_get_accounts_by_prefixes() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let (first, _) = create_test_prefix(&db, 2).await;
    let (second, _) = create_test_prefix(&db, 3).await;

    let accounts = db
        .get_accounts_by_prefixes(&[first.prefix.clone(), second.prefix.clone()])
        .await
        .expect("Failed to list accounts");
    assert_eq!(accounts.len(), 5);

    let none = db
        .get_accounts_by_prefixes(&[])
        .await
        .expect("Failed to list accounts");
    assert!(none.is_empty());
}
