// Account log database operations
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::credentials::{clean_account_id, ACCOUNT_ID_LEN};
use crate::db::{
    models::{Account, DailyCount, LevelCounts, LogEntry, LogLevel, LogSummary, NewLogEntry},
    Database,
};
use crate::stats::split_accounts;

pub const DEFAULT_LOG_LIMIT: i64 = 100;
pub const MAX_LOG_LIMIT: i64 = 1000;
pub const ACTIVITY_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub skip: i64,
    pub limit: i64,
    pub prefix: Option<String>,
    pub account_id: Option<String>,
}

impl LogQuery {
    pub fn new(
        skip: Option<i64>,
        limit: Option<i64>,
        prefix: Option<String>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            skip: skip.unwrap_or(0).max(0),
            limit: limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT),
            prefix: prefix.filter(|p| !p.is_empty()),
            account_id: account_id.filter(|a| !a.trim().is_empty()),
        }
    }
}

/// Which `account_id` values a log query matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    /// Any log that carries an account id.
    AnyAccount,
    Exact(String),
    OneOf(Vec<String>),
}

/// Logs of an original account are also written under its external id once
/// it has one, and logs of a derived account under its parent. A full-length
/// id is treated as an original, anything else as derived.
pub fn resolve_account_filter(account_id: &str, account: Option<&Account>) -> AccountFilter {
    let alias = if account_id.len() == ACCOUNT_ID_LEN {
        account.and_then(|a| a.external_id.clone())
    } else {
        account.and_then(|a| a.parent_account_id.clone())
    };

    match alias {
        Some(alias) => AccountFilter::OneOf(vec![account_id.to_string(), alias]),
        None => AccountFilter::Exact(account_id.to_string()),
    }
}

fn push_account_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: AccountFilter) {
    match filter {
        AccountFilter::AnyAccount => {
            builder.push(" AND account_id IS NOT NULL");
        }
        AccountFilter::Exact(id) => {
            builder.push(" AND account_id = ").push_bind(id);
        }
        AccountFilter::OneOf(ids) => {
            builder.push(" AND account_id = ANY(").push_bind(ids).push(")");
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountGroups {
    pub original_accounts: Vec<Account>,
    pub derived_accounts: Vec<Account>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LogStats {
    pub total: i64,
    pub by_level: LevelCounts,
    pub recent_activity: Vec<DailyCount>,
    pub accounts: AccountGroups,
}

impl Database {
    pub async fn get_unique_prefixes(&self) -> anyhow::Result<Vec<String>> {
        let prefixes = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT prefix FROM account_logs WHERE prefix IS NOT NULL ORDER BY prefix",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(prefixes)
    }

    /// The account filter a query resolves to, looking up the account when
    /// one is named.
    pub async fn account_filter_for(
        &self,
        account_id: Option<&str>,
    ) -> anyhow::Result<AccountFilter> {
        let Some(raw) = account_id.filter(|a| !a.trim().is_empty()) else {
            return Ok(AccountFilter::AnyAccount);
        };

        let cleaned = clean_account_id(raw);
        let account = self.get_account_by_id(&cleaned).await?;
        Ok(resolve_account_filter(&cleaned, account.as_ref()))
    }

    /// Newest first, without metadata.
    pub async fn get_logs(&self, query: &LogQuery) -> anyhow::Result<Vec<LogSummary>> {
        let filter = self.account_filter_for(query.account_id.as_deref()).await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, level, message, account_id, prefix, timestamp FROM account_logs WHERE TRUE",
        );
        if let Some(prefix) = &query.prefix {
            builder.push(" AND prefix = ").push_bind(prefix.clone());
        }
        push_account_filter(&mut builder, filter);
        builder
            .push(" ORDER BY timestamp DESC, id DESC OFFSET ")
            .push_bind(query.skip)
            .push(" LIMIT ")
            .push_bind(query.limit);

        let logs = builder
            .build_query_as::<LogSummary>()
            .fetch_all(&self.pool)
            .await?;
        Ok(logs)
    }

    pub async fn get_log(&self, id: &Uuid) -> anyhow::Result<Option<LogEntry>> {
        let log = sqlx::query_as::<_, LogEntry>(
            "SELECT id, level, message, account_id, prefix, metadata, timestamp
       FROM account_logs
       WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(log)
    }

    pub async fn insert_logs(&self, entries: &[NewLogEntry]) -> anyhow::Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(entries.len());

        for entry in entries {
            let id = sqlx::query_scalar::<_, Uuid>(
                "INSERT INTO account_logs (level, message, account_id, prefix, metadata, timestamp)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id",
            )
            .bind(entry.level.as_str())
            .bind(&entry.message)
            .bind(entry.account_id.as_deref())
            .bind(entry.prefix.as_deref())
            .bind(
                entry
                    .metadata
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({})),
            )
            .bind(entry.timestamp.unwrap_or_else(Utc::now))
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Level counts and daily activity for a prefix, optionally narrowed to
    /// one account, plus the prefix's accounts split into originals and
    /// derived ones.
    pub async fn get_log_stats(
        &self,
        prefix: &str,
        account_id: Option<&str>,
    ) -> anyhow::Result<LogStats> {
        let account_id = account_id
            .map(clean_account_id)
            .filter(|a| !a.is_empty());

        let level_rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT level, COUNT(*)
       FROM account_logs
       WHERE prefix = $1 AND ($2::text IS NULL OR account_id = $2)
       GROUP BY level",
        )
        .bind(prefix)
        .bind(account_id.as_deref())
        .fetch_all(&self.pool)
        .await?;

        let mut by_level = LevelCounts::default();
        for (level, count) in level_rows {
            match LogLevel::try_from(level) {
                Ok(level) => by_level.add(level, count),
                Err(e) => tracing::warn!(error = %e, "Skipping log rows with unknown level"),
            }
        }

        let since = Utc::now() - Duration::days(ACTIVITY_WINDOW_DAYS);
        let activity_rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT to_char(timestamp AT TIME ZONE 'UTC', 'YYYY-MM-DD') AS day, COUNT(*)
       FROM account_logs
       WHERE prefix = $1 AND ($2::text IS NULL OR account_id = $2) AND timestamp >= $3
       GROUP BY day
       ORDER BY day ASC",
        )
        .bind(prefix)
        .bind(account_id.as_deref())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let recent_activity = activity_rows
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect();

        let (original_accounts, derived_accounts) =
            split_accounts(self.get_accounts_by_prefix(prefix).await?);

        Ok(LogStats {
            total: by_level.total(),
            by_level,
            recent_activity,
            accounts: AccountGroups {
                original_accounts,
                derived_accounts,
            },
        })
    }
}
