use std::sync::Arc;
use tracing::info;
use wimt_tracker::collector::{self, PgTrackStore};
use wimt_tracker::config::CollectorConfig;
use wimt_tracker::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = CollectorConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting wimt collector...");

    // Init DB
    let pool = db::init_pool(&config.database_url).await?;
    info!("Connected to database");
    db::ensure_schema(&pool).await?;

    let app = collector::router(Arc::new(PgTrackStore::new(pool)));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Collector listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down collector");
        })
        .await?;

    Ok(())
}
