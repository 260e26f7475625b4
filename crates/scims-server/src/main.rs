//! SCIMS service binary.
//!
//! Wires configuration, storage, the stats cache, the REST API and the
//! periodic jobs together, then serves until the process is stopped.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `scims-config.yaml` (path overridable with
//!    `SCIMS_CONFIG`), then apply env overrides
//! 2. Initialize structured logging (tracing)
//! 3. Open the configured store (memory, or `PostgreSQL` plus migrations)
//! 4. Connect the optional Dragonfly stats cache
//! 5. Start the scheduler (ready-craft completion, usage stats)
//! 6. Serve the REST API

mod error;
mod scheduler;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scims_api::AppState;
use scims_core::config::{LoggingConfig, ScimsConfig, StorageBackend};
use scims_core::{MemoryStore, ScimsStore};
use scims_db::{DragonflyPool, PgStore, PostgresPool};

use crate::error::StartupError;
use crate::scheduler::Scheduler;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "scims-config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let (config, config_found) = load_config().context("loading configuration")?;

    // 2. Initialize structured logging.
    init_logging(&config.logging).context("initializing logging")?;
    info!(
        config_found,
        backend = ?config.storage.backend,
        host = config.server.host,
        port = config.server.port,
        "scims-server starting"
    );

    // 3. Open the store and hand off to the generic runner.
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory store; state is lost on restart");
            run(Arc::new(MemoryStore::new()), &config).await?;
        }
        StorageBackend::Postgres => {
            let pool = PostgresPool::connect(&config.storage)
                .await
                .map_err(StartupError::from)
                .context("connecting to PostgreSQL")?;
            if config.storage.run_migrations {
                pool.run_migrations()
                    .await
                    .map_err(StartupError::from)
                    .context("running migrations")?;
            }
            let store = Arc::new(PgStore::new(pool.pool().clone()));
            let result = run(store, &config).await;
            pool.close().await;
            result?;
        }
    }

    info!("scims-server stopped");
    Ok(())
}

/// Steps 4 to 6 for any store.
async fn run<S: ScimsStore>(store: Arc<S>, config: &ScimsConfig) -> Result<(), StartupError> {
    // 4. Optional stats cache. The service runs without it.
    let cache = match &config.cache.dragonfly_url {
        Some(url) => match DragonflyPool::connect(url).await {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "Dragonfly unavailable, stats will not be cached");
                None
            }
        },
        None => None,
    };

    // 5. Periodic jobs.
    let jobs = Scheduler::new(
        Arc::clone(&store),
        cache.clone(),
        config.cache.stats_ttl_secs,
        config.scheduler.clone(),
    )
    .spawn();

    // 6. REST API.
    let mut state = AppState::new(store);
    if let Some(cache) = cache {
        state = state.with_stats_cache(cache, config.cache.stats_ttl_secs);
    }
    let served = scims_api::start_server(&config.server, Arc::new(state)).await;

    for job in jobs {
        job.abort();
    }
    served?;
    Ok(())
}

/// Read the YAML config if present, otherwise defaults plus env overrides.
fn load_config() -> Result<(ScimsConfig, bool), StartupError> {
    let path = std::env::var("SCIMS_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        Ok((ScimsConfig::from_file(&path)?, true))
    } else {
        let mut config = ScimsConfig::default();
        config.apply_env_overrides();
        Ok((config, false))
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) -> Result<(), StartupError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&logging.level).map_err(|e| StartupError::Logging {
            message: format!("invalid log level {:?}: {e}", logging.level),
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| StartupError::Logging {
        message: e.to_string(),
    })
}
