use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{prelude::*, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use fleet_dashboard::{api, credentials, db, stats, AppState, Config, Database};

/// Fleet Dashboard API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Fleet Dashboard API",
        version = "0.1.0",
        description = "Credential batches, account status and automation logs"
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    paths(
        // Health
        api::health::health,
        // Accounts
        api::accounts::handlers::get_account,
        api::accounts::handlers::check_accounts,
        // Prefixes
        api::prefixes::handlers::get_prefixes,
        api::prefixes::handlers::get_prefixes_overview,
        api::prefixes::handlers::validate_accounts,
        api::prefixes::handlers::create_prefix,
        api::prefixes::handlers::generate_prefix_name,
        // Logs
        api::logs::handlers::get_logs,
        api::logs::handlers::get_log_prefixes,
        api::logs::handlers::get_log_stats,
        api::logs::handlers::get_log,
        // Internal
        api::accounts::handlers::update_account_status,
        api::accounts::handlers::register_derived_account,
        api::logs::handlers::ingest_logs,
    ),
    components(schemas(
        api::common::ErrorResponse,
        db::Prefix,
        db::Account,
        db::AccountState,
        db::LogLevel,
        credentials::ValidationKind,
        credentials::ValidationStats,
        stats::PrefixStats,
        stats::DerivedStats,
        stats::BanSplit,
        stats::GlobalStats,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Accounts", description = "Account lookup"),
        (name = "Prefixes", description = "Credential batches and their statistics"),
        (name = "Logs", description = "Automation logs"),
        (name = "Internal", description = "Endpoints for the automation process"),
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new("X-Api-Key"),
                    ),
                ),
            );
        }
    }
}

fn init_tracing(dev_mode: bool) {
    if dev_mode {
        let console_layer = console_subscriber::ConsoleLayer::builder()
            .server_addr(([127, 0, 0, 1], 6669))
            .spawn();

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(console_layer)
            .init();

        tracing::info!("Tokio console enabled (connect with: tokio-console)");
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
            )
            .init();
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let origin = origin.parse::<HeaderValue>().unwrap_or_else(|_| {
        tracing::warn!(origin, "Invalid CORS_ORIGIN, falling back to localhost");
        HeaderValue::from_static("http://localhost:3000")
    });

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(api::middleware::API_KEY_HEADER),
        ])
        .allow_origin(origin)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing reads DEV_MODE before the config is loaded so that config
    // warnings are visible.
    dotenv::dotenv().ok();
    let dev_mode = std::env::var("DEV_MODE")
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false);
    init_tracing(dev_mode);

    let config = Config::from_env();
    let state = Arc::new(AppState::new(config));

    let database = state.connections.database().await?;
    sqlx::migrate!("./migrations").run(&database.pool).await?;
    tracing::info!("Migrations complete");

    // Pool metrics (dev mode only)
    if state.config.dev_mode {
        let metrics_state = state.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;
                match metrics_state.connections.acquire().await {
                    Ok((generation, pool)) => {
                        Database::new(pool).log_pool_metrics(generation);
                    }
                    Err(e) => tracing::error!(error = %e, "Pool metrics unavailable"),
                }
            }
        });
    }

    let app = api::router(state.clone())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origin));

    let listener = tokio::net::TcpListener::bind(&state.config.bind_address).await?;
    tracing::info!("Fleet dashboard listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
