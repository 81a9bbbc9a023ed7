pub mod audit_repo;
pub mod market_repo;
pub mod phase_repo;
pub mod position_repo;

pub use audit_repo::PgAuditSink;
pub use market_repo::PgMarketDataProvider;
pub use phase_repo::PgPhaseProvider;
pub use position_repo::PgPositionStore;

use anyhow::{Context, Result};
use folio_core::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connects a pool and applies pending migrations.
///
/// # Errors
///
/// Returns an error if the connection or a migration fails.
pub async fn connect_and_migrate(cfg: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect(&cfg.url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    Ok(pool)
}
