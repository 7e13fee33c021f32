// Prefix-related database operations
use crate::db::{
    accounts::insert_accounts_in_tx,
    models::{NewAccount, Prefix},
    Database,
};

/// Outcome of creating a prefix together with its accounts.
#[derive(Debug, Clone)]
pub struct CreatedPrefix {
    pub prefix: Prefix,
    pub inserted_accounts: u64,
}

#[derive(Debug, thiserror::Error)]
#[error("Prefix '{0}' already exists")]
pub struct PrefixExists(pub String);

impl Database {
    pub async fn get_all_prefixes(&self) -> anyhow::Result<Vec<Prefix>> {
        let prefixes = sqlx::query_as::<_, Prefix>(
            "SELECT id, prefix, description, accounts, date_created, date_updated
       FROM prefixes
       ORDER BY date_created DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(prefixes)
    }

    pub async fn count_prefixes(&self) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM prefixes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// One page of prefixes, newest first.
    pub async fn get_prefixes_page(&self, offset: i64, limit: i64) -> anyhow::Result<Vec<Prefix>> {
        let prefixes = sqlx::query_as::<_, Prefix>(
            "SELECT id, prefix, description, accounts, date_created, date_updated
       FROM prefixes
       ORDER BY date_created DESC
       OFFSET $1 LIMIT $2",
        )
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(prefixes)
    }

    pub async fn get_prefix(&self, prefix: &str) -> anyhow::Result<Option<Prefix>> {
        let prefix = sqlx::query_as::<_, Prefix>(
            "SELECT id, prefix, description, accounts, date_created, date_updated
       FROM prefixes
       WHERE prefix = $1",
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(prefix)
    }

    /// Insert the accounts and the prefix in a single transaction. Fails with
    /// [`PrefixExists`] when the name is taken.
    pub async fn create_prefix(
        &self,
        prefix: &str,
        description: &str,
        accounts: &[NewAccount],
    ) -> anyhow::Result<CreatedPrefix> {
        let mut tx = self.pool.begin().await?;

        let inserted_accounts = insert_accounts_in_tx(&mut tx, accounts, prefix).await?;

        let lines: Vec<String> = accounts.iter().map(NewAccount::line).collect();
        let created = sqlx::query_as::<_, Prefix>(
            "INSERT INTO prefixes (prefix, description, accounts, date_created, date_updated)
       VALUES ($1, $2, $3, NOW(), NOW())
       ON CONFLICT (prefix) DO NOTHING
       RETURNING id, prefix, description, accounts, date_created, date_updated",
        )
        .bind(prefix)
        .bind(description)
        .bind(&lines)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(created) = created else {
            tx.rollback().await?;
            return Err(PrefixExists(prefix.to_string()).into());
        };

        tx.commit().await?;

        tracing::info!(
            prefix = %created.prefix,
            inserted_accounts,
            "Prefix created"
        );

        Ok(CreatedPrefix {
            prefix: created,
            inserted_accounts,
        })
    }
}
