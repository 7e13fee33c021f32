pub mod accounts;
pub mod connection;
pub mod logs;
pub mod models;
pub mod prefixes;

pub use models::*;

use sqlx::PgPool;

/// A live pool handed out by the connection manager for one unit of work.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn log_pool_metrics(&self, generation: u64) {
        let size = self.pool.size();
        let idle = self.pool.num_idle();

        tracing::info!(
            generation,
            pool_size = size,
            idle_connections = idle,
            active_connections = size.saturating_sub(idle as u32),
            "Connection pool metrics"
        );
    }
}
