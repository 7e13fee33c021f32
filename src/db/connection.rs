//! Process-wide database handle with single-flight lazy reconnect.
//!
//! The handle is created on first use. When a caller observes a failed
//! liveness ping, the handle is torn down and the next caller reconnects with
//! exponential backoff. Only one connection attempt is in flight at a time;
//! callers that arrive during it wait on the slot and reuse the result.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::{watch, Mutex};

use crate::config::Config;
use crate::db::Database;

/// Opens, checks and closes database handles.
#[cfg_attr(test, mockall::automock(type Handle = u64;))]
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    async fn connect(&self) -> anyhow::Result<Self::Handle>;

    async fn ping(&self, handle: &Self::Handle) -> anyhow::Result<()>;

    async fn close(&self, handle: Self::Handle);
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 0 retries forever.
    pub max_attempts: u32,
    pub liveness_retry_delay: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 0,
            liveness_retry_delay: Duration::from_secs(1),
        }
    }
}

impl ConnectionSettings {
    /// Delay before retrying after failed attempt `attempt` (1-based):
    /// `min(2^attempt * base, max)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

struct Slot<H> {
    generation: u64,
    handle: H,
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    settings: ConnectionSettings,
    slot: Mutex<Option<Slot<C::Handle>>>,
    /// Copy of the slot's handle for readers that must not wait on a connect.
    snapshot: watch::Sender<Option<C::Handle>>,
    generations: AtomicU64,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, settings: ConnectionSettings) -> Self {
        Self {
            connector,
            settings,
            slot: Mutex::new(None),
            snapshot: watch::channel(None).0,
            generations: AtomicU64::new(0),
        }
    }

    /// Returns a handle that has just answered a liveness ping, together with
    /// its generation.
    pub async fn acquire(&self) -> anyhow::Result<(u64, C::Handle)> {
        loop {
            let (generation, handle) = self.current_or_connect().await?;

            match self.connector.ping(&handle).await {
                Ok(()) => return Ok((generation, handle)),
                Err(e) => {
                    tracing::error!(generation, error = %e, "Lost connection to database");
                    self.invalidate(generation).await;
                    tokio::time::sleep(self.settings.liveness_retry_delay).await;
                }
            }
        }
    }

    /// The handle currently held, without connecting or pinging. `None` while
    /// disconnected or while a connection attempt is in flight. Does not wait
    /// on the slot lock.
    pub fn current(&self) -> Option<C::Handle> {
        (*self.snapshot.borrow()).clone()
    }

    /// Whether a handle is held and answers a ping. Never connects.
    pub async fn is_live(&self) -> bool {
        match self.current() {
            Some(handle) => self.connector.ping(&handle).await.is_ok(),
            None => false,
        }
    }

    /// Tear down the handle of `generation`. A no-op when the slot already
    /// holds a newer handle.
    pub async fn invalidate(&self, generation: u64) {
        let stale = {
            let mut slot = self.slot.lock().await;
            match slot.as_ref() {
                Some(current) if current.generation == generation => {
                    self.snapshot.send_replace(None);
                    slot.take()
                }
                _ => None,
            }
        };

        if let Some(stale) = stale {
            tracing::warn!(generation, "Closing database connection");
            self.connector.close(stale.handle).await;
        }
    }

    async fn current_or_connect(&self) -> anyhow::Result<(u64, C::Handle)> {
        // Held across the connect so that concurrent callers queue here and
        // pick up the handle once it is stored.
        let mut slot = self.slot.lock().await;

        if let Some(current) = slot.as_ref() {
            return Ok((current.generation, current.handle.clone()));
        }

        let handle = self.connect_with_backoff().await?;
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        *slot = Some(Slot {
            generation,
            handle: handle.clone(),
        });
        self.snapshot.send_replace(Some(handle.clone()));

        tracing::info!(generation, "Database connection established");
        Ok((generation, handle))
    }

    async fn connect_with_backoff(&self) -> anyhow::Result<C::Handle> {
        let mut attempt: u32 = 1;

        loop {
            let error = match self.connector.connect().await {
                Ok(handle) => match self.connector.ping(&handle).await {
                    Ok(()) => return Ok(handle),
                    Err(e) => {
                        self.connector.close(handle).await;
                        e
                    }
                },
                Err(e) => e,
            };

            tracing::error!(attempt, error = %error, "Database connection attempt failed");

            if self.settings.max_attempts != 0 && attempt >= self.settings.max_attempts {
                return Err(error.context(format!(
                    "Giving up on database connection after {} attempts",
                    attempt
                )));
            }

            let wait = self.settings.backoff_delay(attempt);
            tracing::info!(
                attempt,
                wait_ms = wait.as_millis() as u64,
                "Retrying database connection"
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}

impl ConnectionManager<PgConnector> {
    /// A live `Database` for one request.
    pub async fn database(&self) -> anyhow::Result<Database> {
        let (_, pool) = self.acquire().await?;
        Ok(Database::new(pool))
    }
}

/// Postgres pools built from the runtime configuration.
pub struct PgConnector {
    database_url: String,
    max_connections: u32,
    min_connections: u32,
    acquire_timeout: Duration,
    idle_timeout: Duration,
}

impl PgConnector {
    pub fn from_config(config: &Config) -> Self {
        Self {
            database_url: config.database_url.clone(),
            max_connections: config.pool_max,
            min_connections: config.pool_min,
            acquire_timeout: config.acquire_timeout,
            idle_timeout: config.idle_timeout,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Handle = PgPool;

    async fn connect(&self) -> anyhow::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(Some(self.idle_timeout))
            .connect(&self.database_url)
            .await
            .context("Failed to open database pool")?;

        tracing::info!(
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            "Database pool opened"
        );
        Ok(pool)
    }

    async fn ping(&self, pool: &PgPool) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    async fn close(&self, pool: PgPool) {
        pool.close().await;
    }
}
