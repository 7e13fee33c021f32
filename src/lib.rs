// Library entry point for the binary and tests
pub mod api;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod stats;

pub use config::Config;
pub use db::Database;

use db::connection::{ConnectionManager, PgConnector};

pub struct AppState {
    pub connections: ConnectionManager<PgConnector>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let connections =
            ConnectionManager::new(PgConnector::from_config(&config), config.connection_settings());
        Self {
            connections,
            config,
        }
    }
}
