//! Error types for the SCIMS server binary.

/// Startup and runtime failures of the service.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: scims_core::config::ConfigError,
    },

    /// `PostgreSQL` connection or migration failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: scims_db::DbError,
    },

    /// The API server failed to bind or serve.
    #[error("api error: {source}")]
    Api {
        /// The underlying server error.
        #[from]
        source: scims_api::ServerError,
    },

    /// The logging filter could not be built.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
