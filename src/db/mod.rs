use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

pub mod queries;

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(50)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Creates the collector table if this is a fresh database.
pub async fn ensure_schema(pool: &DbPool) -> Result<()> {
    sqlx::query(queries::CREATE_TRACKING_POINTS)
        .execute(pool)
        .await?;
    sqlx::query(queries::CREATE_SESSION_INDEX)
        .execute(pool)
        .await?;
    info!("tracking_points schema ready");
    Ok(())
}
