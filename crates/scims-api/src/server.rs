//! HTTP listener lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use scims_core::ScimsStore;
use scims_core::config::ServerConfig;

use crate::router::build_router;
use crate::state::AppState;

/// Failure to start or keep serving the API.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// `host:port` from the config is not a socket address.
    #[error("invalid listen address {0}")]
    Address(String),

    /// The socket could not be bound.
    #[error("cannot bind {addr}: {source}")]
    Bind {
        /// Address attempted.
        addr: SocketAddr,
        /// OS error.
        source: std::io::Error,
    },

    /// The accept loop failed.
    #[error("serve: {0}")]
    Serve(#[source] std::io::Error),
}

/// Serve the API on `config.host:config.port` until Ctrl-C.
///
/// In-flight requests finish before this returns.
///
/// # Errors
///
/// See [`ServerError`].
pub async fn start_server<S: ScimsStore>(
    config: &ServerConfig,
    state: Arc<AppState<S>>,
) -> Result<(), ServerError> {
    let text = format!("{}:{}", config.host, config.port);
    let addr: SocketAddr = text
        .parse()
        .map_err(|e| ServerError::Address(format!("{text}: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    tracing::info!(%addr, "SCIMS API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Serve)?;

    tracing::info!("SCIMS API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[cfg(test)]
mod tests {
    use scims_core::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn bad_host_is_an_address_error() {
        let config = ServerConfig {
            host: String::from("not a host"),
            port: 8080,
        };
        let state = Arc::new(AppState::new(Arc::new(MemoryStore::new())));
        let result = start_server(&config, state).await;
        assert!(matches!(result, Err(ServerError::Address(_))));
    }
}
