// Common test utilities and helpers
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use fleet_dashboard::{
    credentials::parse_batch,
    db::{NewAccount, Prefix},
    Database,
};

/// Setup test database using TEST_DATABASE_URL from environment
///
/// Returns `None` when TEST_DATABASE_URL is not set so that the suite can run
/// without a database. Tests are isolated by unique prefixes and account ids.
pub async fn setup_test_db() -> Option<Database> {
    dotenv::dotenv().ok();

    let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    Some(Database::new(pool))
}

pub fn unique_prefix() -> String {
    format!("pf_test_{}", Uuid::new_v4().simple())
}

/// A 64-char auth key whose account id (first 32 chars) is unique.
pub fn unique_auth_key() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

pub fn new_accounts(count: usize) -> Vec<NewAccount> {
    let raw: Vec<String> = (0..count)
        .map(|i| format!("{}:{}", unique_auth_key(), i % 5 + 1))
        .collect();
    parse_batch(&raw.join("\n"))
        .expect("Generated batch must parse")
        .accounts
}

/// Create a prefix holding `count` fresh original accounts.
pub async fn create_test_prefix(db: &Database, count: usize) -> (Prefix, Vec<NewAccount>) {
    let accounts = new_accounts(count);
    let created = db
        .create_prefix(&unique_prefix(), "Test batch", &accounts)
        .await
        .expect("Failed to create test prefix");
    (created.prefix, accounts)
}
