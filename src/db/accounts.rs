// Account-related database operations
use sqlx::{Postgres, Transaction};
use thiserror::Error;

use crate::db::{
    models::{Account, AccountStatusPatch, NewAccount},
    Database,
};

const ACCOUNT_COLUMNS: &str = "account_id, dc_id, auth_key, prefix, external_id, parent_account_id,
       banned, reason, stable, worked_out, error, extra, created_at, updated_at";

/// The id asked to be registered as derived already belongs to an account that
/// is not derived from the same parent.
#[derive(Debug, Error)]
#[error("Account '{0}' already exists and is not derived from this parent")]
pub struct DerivedAccountConflict(pub String);

/// Insert parsed accounts under `prefix`, skipping ids that already exist.
/// Returns the number of rows written.
pub async fn insert_accounts_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    accounts: &[NewAccount],
    prefix: &str,
) -> anyhow::Result<u64> {
    if accounts.is_empty() {
        return Ok(0);
    }

    let ids: Vec<&str> = accounts.iter().map(|a| a.account_id.as_str()).collect();
    let keys: Vec<&str> = accounts.iter().map(|a| a.auth_key.as_str()).collect();
    let dcs: Vec<i32> = accounts.iter().map(|a| a.dc_id).collect();

    let result = sqlx::query(
        "INSERT INTO accounts (account_id, auth_key, dc_id, prefix)
       SELECT id, key, dc, $4
       FROM UNNEST($1::text[], $2::text[], $3::int[]) AS batch(id, key, dc)
       ON CONFLICT (account_id) DO NOTHING",
    )
    .bind(&ids)
    .bind(&keys)
    .bind(&dcs)
    .bind(prefix)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

impl Database {
    /// Ids among `account_ids` that are already stored.
    pub async fn check_existing_accounts(
        &self,
        account_ids: &[String],
    ) -> anyhow::Result<Vec<String>> {
        if account_ids.is_empty() {
            return Ok(Vec::new());
        }

        let existing = sqlx::query_scalar::<_, String>(
            "SELECT account_id FROM accounts WHERE account_id = ANY($1)",
        )
        .bind(account_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(existing)
    }

    pub async fn create_accounts(
        &self,
        accounts: &[NewAccount],
        prefix: &str,
    ) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_accounts_in_tx(&mut tx, accounts, prefix).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn get_account_by_id(&self, account_id: &str) -> anyhow::Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    pub async fn get_accounts_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE prefix = $1 ORDER BY created_at, account_id"
        ))
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    pub async fn get_accounts_by_prefixes(
        &self,
        prefixes: &[String],
    ) -> anyhow::Result<Vec<Account>> {
        if prefixes.is_empty() {
            return Ok(Vec::new());
        }

        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE prefix = ANY($1) ORDER BY created_at, account_id"
        ))
        .bind(prefixes)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    /// Apply the fields present in `patch`. `None` when the account does not exist.
    pub async fn update_account_status(
        &self,
        account_id: &str,
        patch: &AccountStatusPatch,
    ) -> anyhow::Result<Option<Account>> {
        // Text fields come as (present, value) pairs so a null can clear them
        let account = sqlx::query_as::<_, Account>(&format!(
            "UPDATE accounts SET
         banned = COALESCE($2, banned),
         reason = CASE WHEN $3::boolean THEN $4::text ELSE reason END,
         stable = COALESCE($5, stable),
         worked_out = COALESCE($6, worked_out),
         error = CASE WHEN $7::boolean THEN $8::text ELSE error END,
         external_id = CASE WHEN $9::boolean THEN $10::text ELSE external_id END,
         updated_at = NOW()
       WHERE account_id = $1
       RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(account_id)
        .bind(patch.banned)
        .bind(patch.reason.is_some())
        .bind(patch.reason.clone().flatten())
        .bind(patch.stable)
        .bind(patch.worked_out)
        .bind(patch.error.is_some())
        .bind(patch.error.clone().flatten())
        .bind(patch.external_id.is_some())
        .bind(patch.external_id.clone().flatten())
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    /// Record an account spawned from `parent_account_id`. It joins the
    /// parent's prefix. `None` when the parent does not exist.
    ///
    /// Registering again under the same parent refreshes the credentials. An
    /// id held by any other account fails with [`DerivedAccountConflict`].
    pub async fn register_derived_account(
        &self,
        parent_account_id: &str,
        account: &NewAccount,
    ) -> anyhow::Result<Option<Account>> {
        let derived = sqlx::query_as::<_, Account>(&format!(
            "INSERT INTO accounts (account_id, auth_key, dc_id, prefix, parent_account_id)
       SELECT $1, $2, $3, parent.prefix, parent.account_id
       FROM accounts parent
       WHERE parent.account_id = $4
       ON CONFLICT (account_id) DO UPDATE
       SET auth_key = EXCLUDED.auth_key,
           dc_id = EXCLUDED.dc_id,
           updated_at = NOW()
       WHERE accounts.parent_account_id = EXCLUDED.parent_account_id
       RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(&account.account_id)
        .bind(&account.auth_key)
        .bind(account.dc_id)
        .bind(parent_account_id)
        .fetch_optional(&self.pool)
        .await?;

        if derived.is_some() {
            return Ok(derived);
        }
        // Nothing written: either the parent is missing or the id is taken
        if self.get_account_by_id(&account.account_id).await?.is_some()
            && self.get_account_by_id(parent_account_id).await?.is_some()
        {
            return Err(DerivedAccountConflict(account.account_id.clone()).into());
        }
        Ok(None)
    }
}
