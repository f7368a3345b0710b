use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Connects to PostgreSQL and applies the poster run schema (`migrations/`).
pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("PostgreSQL connection failed")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Applying poster schema migrations failed")?;

    info!("PostgreSQL pool ready, schema up to date");
    Ok(pool)
}
