// Integration tests for account log database operations
use chrono::{Duration, Utc};
use serde_json::json;

use fleet_dashboard::db::logs::LogQuery;
use fleet_dashboard::db::{AccountStatusPatch, LogLevel, NewAccount, NewLogEntry};
use fleet_dashboard::Database;

use crate::common::{create_test_prefix, setup_test_db, unique_prefix};

fn entry(level: LogLevel, message: &str, account_id: Option<&str>, prefix: &str) -> NewLogEntry {
    NewLogEntry {
        level,
        message: message.to_string(),
        account_id: account_id.map(str::to_string),
        prefix: Some(prefix.to_string()),
        metadata: None,
        timestamp: None,
    }
}

async fn logs_for(db: &Database, prefix: &str, account_id: Option<&str>) -> Vec<String> {
    let query = LogQuery::new(
        None,
        None,
        Some(prefix.to_string()),
        account_id.map(str::to_string),
    );
    db.get_logs(&query)
        .await
        .expect("Failed to get logs")
        .into_iter()
        .map(|log| log.message)
        .collect()
}

#[tokio::test]
async fn test_insert_and_get_log_with_metadata() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let prefix = unique_prefix();

    let mut new = entry(LogLevel::Warn, "Session expired", Some("acc_1"), &prefix);
    new.metadata = Some(json!({ "attempt": 3, "proxy": "10.0.0.1" }));

    let ids = db.insert_logs(&[new]).await.expect("Failed to insert log");
    assert_eq!(ids.len(), 1);

    let log = db
        .get_log(&ids[0])
        .await
        .expect("Failed to get log")
        .expect("Log should exist");
    assert_eq!(log.level, LogLevel::Warn);
    assert_eq!(log.metadata["attempt"], 3);
    assert_eq!(log.prefix.as_deref(), Some(prefix.as_str()));

    let missing = db
        .get_log(&uuid::Uuid::new_v4())
        .await
        .expect("Failed to get log");
    assert!(missing.is_none());

    let prefixes = db
        .get_unique_prefixes()
        .await
        .expect("Failed to get prefixes");
    assert!(prefixes.contains(&prefix));
}

#[tokio::test]
async fn test_logs_are_newest_first_and_paged() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let prefix = unique_prefix();
    let now = Utc::now();

    let entries: Vec<NewLogEntry> = (0..5)
        .map(|i| {
            let mut e = entry(LogLevel::Info, &format!("step {i}"), Some("acc_page"), &prefix);
            e.timestamp = Some(now - Duration::minutes(10 - i));
            e
        })
        .collect();
    db.insert_logs(&entries).await.expect("Failed to insert logs");

    // Without an account id the entry is not listed
    db.insert_logs(&[entry(LogLevel::Info, "orphan", None, &prefix)])
        .await
        .expect("Failed to insert log");

    let messages = logs_for(&db, &prefix, None).await;
    assert_eq!(
        messages,
        vec!["step 4", "step 3", "step 2", "step 1", "step 0"]
    );

    let page = db
        .get_logs(&LogQuery::new(
            Some(1),
            Some(2),
            Some(prefix.clone()),
            None,
        ))
        .await
        .expect("Failed to get logs");
    let page: Vec<&str> = page.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(page, vec!["step 3", "step 2"]);
}

#[tokio::test]
async fn test_account_filter_follows_external_and_parent_ids() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let (prefix, accounts) = create_test_prefix(&db, 1).await;
    let original = accounts[0].account_id.clone();
    let external = format!("ext{}", &original[..8]);
    let derived_id = format!("der{}", &original[..8]);

    db.update_account_status(
        &original,
        &AccountStatusPatch {
            external_id: Some(Some(external.clone())),
            ..Default::default()
        },
    )
    .await
    .expect("Failed to update status");
    db.register_derived_account(
        &original,
        &NewAccount {
            account_id: derived_id.clone(),
            auth_key: "derivedkey".to_string(),
            dc_id: 2,
        },
    )
    .await
    .expect("Failed to register derived account");

    let p = prefix.prefix.as_str();
    db.insert_logs(&[
        entry(LogLevel::Info, "by original", Some(&original), p),
        entry(LogLevel::Info, "by external", Some(&external), p),
        entry(LogLevel::Info, "by derived", Some(&derived_id), p),
        entry(LogLevel::Info, "unrelated", Some("someone_else"), p),
    ])
    .await
    .expect("Failed to insert logs");

    let mut by_original = logs_for(&db, p, Some(&original)).await;
    by_original.sort();
    assert_eq!(by_original, vec!["by external", "by original"]);

    let mut by_derived = logs_for(&db, p, Some(&format!(" {derived_id}\n"))).await;
    by_derived.sort();
    assert_eq!(by_derived, vec!["by derived", "by original"]);

    assert_eq!(logs_for(&db, p, Some("someone_else")).await, vec!["unrelated"]);
}

#[tokio::test]
async fn test_log_stats_for_prefix() {
    let Some(db) = setup_test_db().await else {
        return;
    };
    let (prefix, accounts) = create_test_prefix(&db, 2).await;
    let p = prefix.prefix.as_str();
    let first = accounts[0].account_id.as_str();

    let mut old = entry(LogLevel::Error, "old failure", Some(first), p);
    old.timestamp = Some(Utc::now() - Duration::days(30));

    db.insert_logs(&[
        entry(LogLevel::Info, "started", Some(first), p),
        entry(LogLevel::Warn, "slow proxy", Some(first), p),
        entry(LogLevel::Error, "banned", Some(&accounts[1].account_id), p),
        old,
    ])
    .await
    .expect("Failed to insert logs");

    let stats = db.get_log_stats(p, None).await.expect("Failed to get stats");
    assert_eq!(stats.total, 4);
    assert_eq!(
        (stats.by_level.error, stats.by_level.info, stats.by_level.warn),
        (2, 1, 1)
    );
    // The 30-day-old entry is outside the activity window
    let today = Utc::now().format("%Y-%m-%d").to_string();
    assert_eq!(stats.recent_activity.len(), 1);
    assert_eq!(stats.recent_activity[0].date, today);
    assert_eq!(stats.recent_activity[0].count, 3);
    assert_eq!(stats.accounts.original_accounts.len(), 2);
    assert!(stats.accounts.derived_accounts.is_empty());

    let narrowed = db
        .get_log_stats(p, Some(first))
        .await
        .expect("Failed to get stats");
    assert_eq!(narrowed.total, 3);
    assert_eq!(narrowed.by_level.warn, 1);

    let empty = db
        .get_log_stats(&unique_prefix(), None)
        .await
        .expect("Failed to get stats");
    assert_eq!(empty.total, 0);
    assert!(empty.recent_activity.is_empty());
}
