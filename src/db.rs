//! SQLite pool setup and schema migration.

use anyhow::Result;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

/// Schema applied by `--migrate`, embedded at build time.
const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Open a pool against `database_url`, creating the file if needed.
/// Foreign keys are switched on for every connection so cascades apply.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Run the embedded schema statement by statement.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// A migrated private in-memory database. A single connection that never
/// expires, since every new in-memory connection is a fresh database.
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("valid in-memory url")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("open in-memory sqlite");
    run_migrations(&pool).await.expect("apply schema");
    pool
}
