//! Database connection pool management.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::Config;

/// Create a PostgreSQL connection pool.
pub async fn create_pool(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Create the writer and reader pools. When both point at the same URL
/// the reader shares the writer pool.
pub async fn create_pools(config: &Config) -> Result<(PgPool, PgPool)> {
    let writer = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("failed to create writer pool")?;

    let reader = if config.database_reader_url == config.database_url {
        writer.clone()
    } else {
        info!("using separate reader database");
        create_pool(&config.database_reader_url, config.database_max_connections)
            .await
            .context("failed to create reader pool")?
    };

    Ok((writer, reader))
}

/// Check if the database connection is healthy.
pub async fn check_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Apply pending migrations from `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run migrations")?;
    Ok(())
}
