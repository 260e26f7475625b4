//! `PostgreSQL` pool setup and schema migrations.
//!
//! Queries are built at runtime rather than checked at compile time, so no
//! database is needed to build the crate. Every query binds its parameters.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use scims_core::config::StorageConfig;

use crate::error::DbError;

/// Idle connections are dropped after this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Pool options derived from the `storage` section of `scims-config.yaml`.
fn pool_options(storage: &StorageConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(storage.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(storage.acquire_timeout_secs))
        .idle_timeout(IDLE_TIMEOUT)
}

/// Owned `PostgreSQL` pool plus migration runner.
#[derive(Debug, Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Open a pool as described by `storage`.
    ///
    /// # Errors
    ///
    /// [`DbError::Config`] for a malformed `postgres_url`,
    /// [`DbError::Postgres`] when no connection can be established.
    pub async fn connect(storage: &StorageConfig) -> Result<Self, DbError> {
        let options: PgConnectOptions = storage
            .postgres_url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("bad postgres_url: {e}")))?;

        let pool = pool_options(storage).connect_with(options).await?;
        tracing::info!(
            max_connections = storage.max_connections,
            acquire_timeout_secs = storage.acquire_timeout_secs,
            "PostgreSQL pool ready"
        );
        Ok(Self { pool })
    }

    /// Open a pool for `url` with the default storage settings.
    ///
    /// # Errors
    ///
    /// Same as [`PostgresPool::connect`].
    pub async fn connect_url(url: &str) -> Result<Self, DbError> {
        let storage = StorageConfig {
            postgres_url: url.to_owned(),
            ..StorageConfig::default()
        };
        Self::connect(&storage).await
    }

    /// Apply the embedded `migrations/` that have not run yet.
    ///
    /// # Errors
    ///
    /// [`DbError::Migration`] when a migration fails.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("schema up to date");
        Ok(())
    }

    /// The underlying pool, for building a [`PgStore`](crate::PgStore).
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for checked-out connections and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_options_follow_storage_section() {
        let storage = StorageConfig {
            max_connections: 3,
            acquire_timeout_secs: 9,
            ..StorageConfig::default()
        };
        let options = pool_options(&storage);
        assert_eq!(options.get_max_connections(), 3);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(9));
        assert_eq!(options.get_idle_timeout(), Some(IDLE_TIMEOUT));
    }

    #[test]
    fn zero_connections_is_raised_to_one() {
        let storage = StorageConfig {
            max_connections: 0,
            ..StorageConfig::default()
        };
        assert_eq!(pool_options(&storage).get_max_connections(), 1);
    }

    #[tokio::test]
    async fn malformed_url_is_a_config_error() {
        let result = PostgresPool::connect_url("not a url").await;
        assert!(matches!(result, Err(DbError::Config(_))));
    }
}
