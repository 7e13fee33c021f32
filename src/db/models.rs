use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Prefix {
    pub id: Uuid,
    pub prefix: String,
    pub description: String,
    /// Raw `authKey:dcId` lines accepted when the prefix was created.
    pub accounts: Vec<String>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Account {
    pub account_id: String,
    pub dc_id: i32,
    #[serde(skip_serializing, default)]
    pub auth_key: String,
    pub prefix: String,
    pub external_id: Option<String>,
    pub parent_account_id: Option<String>,
    pub banned: bool,
    pub reason: Option<String>,
    pub stable: bool,
    pub worked_out: bool,
    pub error: Option<String>,
    #[schema(value_type = Object)]
    pub extra: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_derived(&self) -> bool {
        self.parent_account_id.is_some()
    }

    /// Banned outright or carrying a ban reason.
    pub fn is_banned(&self) -> bool {
        self.banned || self.reason.is_some()
    }

    pub fn state(&self) -> AccountState {
        if self.is_banned() {
            AccountState::Banned
        } else if self.is_derived() {
            if self.stable {
                AccountState::Stable
            } else {
                AccountState::Checking
            }
        } else if self.worked_out {
            AccountState::Processed
        } else if self.error.is_some() {
            AccountState::Errored
        } else {
            AccountState::InProgress
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    InProgress,
    Processed,
    Errored,
    Banned,
    Checking,
    Stable,
}

/// Fields the automation process reports about an account. Absent fields are
/// left untouched. For the text fields an explicit `null` clears the value,
/// so `error: Some(None)` sends an errored account back to in progress.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AccountStatusPatch {
    pub banned: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub reason: Option<Option<String>>,
    pub stable: Option<bool>,
    pub worked_out: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub error: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub external_id: Option<Option<String>>,
}

/// Wraps whatever was sent, `null` included, so it can be told apart from a
/// missing field (which `default` turns into `None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A parsed `authKey:dcId` credential ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub account_id: String,
    pub auth_key: String,
    pub dc_id: i32,
}

impl NewAccount {
    /// The `authKey:dcId` form the account was parsed from.
    pub fn line(&self) -> String {
        format!("{}:{}", self.auth_key, self.dc_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Info,
    Warn,
}

impl LogLevel {
    pub const ALL: [LogLevel; 3] = [LogLevel::Error, LogLevel::Info, LogLevel::Warn];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, anyhow::Error> {
        match value.as_str() {
            "error" => Ok(LogLevel::Error),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            other => Err(anyhow::anyhow!("Unknown log level: {}", other)),
        }
    }
}

/// A log row without its metadata payload, as shown in the log list.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LogSummary {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub level: LogLevel,
    pub message: String,
    pub account_id: Option<String>,
    pub prefix: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LogEntry {
    pub id: Uuid,
    #[sqlx(try_from = "String")]
    pub level: LogLevel,
    pub message: String,
    pub account_id: Option<String>,
    pub prefix: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewLogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DailyCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct LevelCounts {
    pub error: i64,
    pub info: i64,
    pub warn: i64,
}

impl LevelCounts {
    pub fn add(&mut self, level: LogLevel, count: i64) {
        match level {
            LogLevel::Error => self.error += count,
            LogLevel::Info => self.info += count,
            LogLevel::Warn => self.warn += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.error + self.info + self.warn
    }
}
