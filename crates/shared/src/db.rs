//! Database utilities and connection management

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::{future::Future, str::FromStr, time::Duration};

use crate::error::StoreError;

/// Default bound for a single store round trip on the request path
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Create a database connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url)?;

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(60))
        .max_lifetime(Duration::from_secs(300))
        .connect_with(options)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

/// Run a store operation under a hard deadline.
///
/// Authentication sits on the request hot path, so a hung datastore must
/// surface as `StoreError::Timeout` instead of stalling the request.
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout = ?limit, "Store operation exceeded deadline");
            Err(StoreError::Timeout(limit))
        }
    }
}
