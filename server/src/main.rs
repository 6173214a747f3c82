use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use perk_server::config::{Config, StoreBackend};
use perk_server::routes::create_routes;
use perk_server::services::sweep::spawn_sweeper;
use perk_server::services::StoreContext;
use perk_server::state::AppState;
use perk_server::store::{MemoryStore, PgStore, Store};
use perk_server::utils::clock::SystemClock;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let store = PgStore::connect(&config).await?;
            tracing::info!("Successfully connected to database");
            store.migrate().await?;
            tracing::info!("Migrations run successfully");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let ctx = StoreContext::new(store, Arc::new(SystemClock), config.store_timeout);

    if let Some(period) = config.sweep_interval {
        spawn_sweeper(ctx.clone(), period);
    }

    let state = AppState::new(ctx, config.slot_granularity_minutes);
    let app = create_routes(state, &config);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server running at http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
