//! Parsing and validation of raw `authKey:dcId` credential batches.

use std::collections::HashSet;
use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::db::NewAccount;

pub const ACCOUNTS_LIMIT: usize = 20_000;

/// Account ids are the leading characters of the auth key.
pub const ACCOUNT_ID_LEN: usize = 32;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static ACCOUNT_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9]+:[0-9]+$").expect("account format regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("No accounts provided")]
    Empty,

    #[error("Account limit of {limit} exceeded ({count} provided)")]
    TooMany { count: usize, limit: usize },

    #[error("Invalid account format on line {line}. Each account must be authKey:dcId.")]
    InvalidFormat { line: usize },

    #[error("dcId out of range on line {line}")]
    DcOutOfRange { line: usize },

    #[error("All accounts already exist in the system ({total})")]
    AllExist { total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBatch {
    /// Non-blank lines in the input.
    pub total: usize,
    /// Unique accounts in input order; later duplicates are dropped.
    pub accounts: Vec<NewAccount>,
}

impl ParsedBatch {
    pub fn account_ids(&self) -> Vec<String> {
        self.accounts.iter().map(|a| a.account_id.clone()).collect()
    }
}

/// A parsed batch checked against the ids already stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub total: usize,
    /// Ids of the batch that are already stored.
    pub existing: Vec<String>,
    /// Lines repeating an id seen earlier in the batch.
    pub duplicates: usize,
    pub accounts: Vec<NewAccount>,
}

impl BatchPlan {
    /// Lines that will not be inserted: already stored or repeated in the batch.
    pub fn skipped(&self) -> usize {
        self.total - self.accounts.len()
    }

    pub fn lines(&self) -> Vec<String> {
        self.accounts.iter().map(NewAccount::line).collect()
    }

    pub fn report(&self) -> ValidationReport {
        let mut message = format!(
            "Total accounts: {}\n• {} already in the system",
            self.total,
            self.existing.len()
        );
        if self.duplicates > 0 {
            message.push_str(&format!("\n• {} duplicated in the batch", self.duplicates));
        }
        message.push_str(&format!("\n• {} will be added", self.accounts.len()));

        ValidationReport {
            is_valid: true,
            message,
            kind: ValidationKind::Warning,
            stats: Some(ValidationStats {
                total: self.total,
                existing: self.existing.len(),
                duplicates: self.duplicates,
                new: self.accounts.len(),
                existing_account_ids: self.existing.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ValidationKind {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidationStats {
    pub total: usize,
    pub existing: usize,
    pub duplicates: usize,
    pub new: usize,
    pub existing_account_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub message: String,
    pub kind: ValidationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ValidationStats>,
}

impl From<&BatchError> for ValidationReport {
    fn from(err: &BatchError) -> Self {
        ValidationReport {
            is_valid: false,
            message: err.to_string(),
            kind: ValidationKind::Error,
            stats: None,
        }
    }
}

pub fn parse_batch(raw: &str) -> Result<ParsedBatch, BatchError> {
    let lines: Vec<&str> = raw
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(BatchError::Empty);
    }
    if lines.len() > ACCOUNTS_LIMIT {
        return Err(BatchError::TooMany {
            count: lines.len(),
            limit: ACCOUNTS_LIMIT,
        });
    }

    let mut seen = HashSet::with_capacity(lines.len());
    let mut accounts = Vec::with_capacity(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        if !ACCOUNT_FORMAT.is_match(line) {
            return Err(BatchError::InvalidFormat { line: line_no });
        }
        let Some((auth_key, dc)) = line.split_once(':') else {
            return Err(BatchError::InvalidFormat { line: line_no });
        };
        let dc_id: i32 = dc
            .parse()
            .map_err(|_| BatchError::DcOutOfRange { line: line_no })?;

        // The format check guarantees ASCII, so byte slicing is safe.
        let account_id = auth_key[..auth_key.len().min(ACCOUNT_ID_LEN)].to_string();
        if seen.insert(account_id.clone()) {
            accounts.push(NewAccount {
                account_id,
                auth_key: auth_key.to_string(),
                dc_id,
            });
        }
    }

    Ok(ParsedBatch {
        total: lines.len(),
        accounts,
    })
}

pub fn plan_batch(parsed: ParsedBatch, existing: Vec<String>) -> Result<BatchPlan, BatchError> {
    let duplicates = parsed.total - parsed.accounts.len();
    let existing_set: HashSet<&str> = existing.iter().map(String::as_str).collect();
    // Only ids that are part of this batch count as existing
    let existing: Vec<String> = parsed
        .accounts
        .iter()
        .filter(|a| existing_set.contains(a.account_id.as_str()))
        .map(|a| a.account_id.clone())
        .collect();
    let accounts: Vec<NewAccount> = parsed
        .accounts
        .into_iter()
        .filter(|a| !existing_set.contains(a.account_id.as_str()))
        .collect();

    if accounts.is_empty() {
        return Err(BatchError::AllExist {
            total: parsed.total,
        });
    }

    Ok(BatchPlan {
        total: parsed.total,
        existing,
        duplicates,
        accounts,
    })
}

/// `pf_<base36 unix millis>_<4 random base36 chars>`
pub fn generate_prefix() -> String {
    let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let random: String = (0..4)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();

    format!("pf_{}_{}", to_base36(millis), random)
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Strip whitespace and anything that cannot appear in an account id.
pub fn clean_account_id(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}
