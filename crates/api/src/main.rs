use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use domain::services::JobStore;
use persistence::{InMemoryJobStore, PgJobStore};
use sfswitch_api::{app, config, middleware, services::SalesforceClient};
use tracing::{info, warn};

async fn open_store(config: &config::DatabaseConfig) -> Result<Arc<dyn JobStore>> {
    if config.is_memory() {
        warn!("Using the in-memory job store; jobs are lost on restart");
        return Ok(Arc::new(InMemoryJobStore::new()));
    }

    let pool = persistence::db::create_pool(&config.pool_config())
        .await
        .context("Failed to connect to the database")?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;
    info!("Migrations completed");

    Ok(Arc::new(PgJobStore::new(pool)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;

    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting sfswitch v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config.database).await?;
    let api = Arc::new(SalesforceClient::new(config.salesforce.clone())?);

    let addr = config.socket_addr()?;
    let grace = Duration::from_secs(config.worker.shutdown_grace_secs);
    let (router, background) = app::build(config, store, api);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    background.shutdown(grace).await;
    info!("Shutdown complete");

    Ok(())
}
