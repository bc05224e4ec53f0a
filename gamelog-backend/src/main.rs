use anyhow::Context;
use gamelog_backend::{AppState, create_app, reset::spawn_daily_reset};
use gamelog_db::Database;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = tracing::Level::DEBUG;
    #[cfg(not(debug_assertions))]
    let log_level = tracing::Level::INFO;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting gamelog backend server...");

    // Load configuration from environment variables or use defaults
    let config = gamelog_backend::config::Config::from_env();
    tracing::info!(
        "Configuration: port={}, db_path={}, body_limit={}KB, timeout={}s, session_ttl={}s",
        config.port,
        config.database_path,
        config.request_body_limit / 1024,
        config.request_timeout.as_secs(),
        config.session_ttl_secs
    );
    tracing::info!(
        "Rate limits: login={}/min (burst {}), report={}/sec (burst {}), general={}/sec (burst {})",
        config.rate_limit_login_per_min,
        config.rate_limit_login_burst,
        config.rate_limit_report_per_sec,
        config.rate_limit_report_burst,
        config.rate_limit_general_per_sec,
        config.rate_limit_general_burst
    );

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("opening database at {}", config.database_path))?;
    let state = Arc::new(
        AppState::initialize(db, &config)
            .await
            .context("initializing caches")?,
    );

    let _reset = spawn_daily_reset(Arc::clone(&state));

    let app = create_app(
        state,
        config.request_body_limit,
        config.request_timeout,
        config.rate_limit(),
    );
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}
