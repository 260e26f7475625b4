//! Data layer errors and their mapping onto [`StoreError`].

use scims_core::StoreError;

/// Failure inside `PostgreSQL`, `Dragonfly` or row decoding.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Query or connection failure.
    #[error("postgres: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Schema migration failure.
    #[error("migration: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Stats cache failure.
    #[error("dragonfly: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// JSON encoding of cached values or attribute columns.
    #[error("json: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A column value the domain types cannot represent.
    #[error("undecodable row: {0}")]
    Decode(String),

    /// Bad connection settings.
    #[error("config: {0}")]
    Config(String),
}

impl From<scims_types::ParseEnumError> for DbError {
    fn from(err: scims_types::ParseEnumError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Callers of [`ScimsStore`](scims_core::ScimsStore) see backend failures
/// as [`StoreError::Backend`]; the detail is logged here.
impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        tracing::error!(error = %err, "data layer failure");
        Self::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_errors_surface_as_backend_failures() {
        let store: StoreError = DbError::Decode(String::from("status 'paused'")).into();
        assert!(matches!(store, StoreError::Backend(ref msg) if msg.contains("paused")));
    }
}
