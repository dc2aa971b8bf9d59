//! Paygate Shared
//!
//! Infrastructure shared by the API server and the background worker:
//! database pool construction and schema migrations.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Default connection pool size for request-serving processes
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Create the database connection pool used for regular queries
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::debug!(max_connections = DEFAULT_MAX_CONNECTIONS, "Database pool created");
    Ok(pool)
}

/// Create a pool for running migrations
///
/// Migrations use a single connection with generous timeouts. Keep this
/// pointed at the direct database URL, not a transaction-mode pooler:
/// `sqlx::migrate!` relies on prepared statements.
pub async fn create_migration_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
}

/// Run all pending schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
