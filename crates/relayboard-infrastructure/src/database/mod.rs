//! Postgres connection pool and migration runner.

use relayboard_domain::error::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::error::from_sqlx;

/// Build the Postgres connection pool from [`DatabaseConfig`].
///
/// # Errors
///
/// Returns [`relayboard_domain::Error::Database`] if the pool cannot connect.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(|e| from_sqlx("connecting to database", e))
}

/// Run pending migrations embedded at compile time from `migrations/`.
///
/// # Errors
///
/// Returns [`relayboard_domain::Error::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| relayboard_domain::Error::database_with_source("running migrations", e))
}
