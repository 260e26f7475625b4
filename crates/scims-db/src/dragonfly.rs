//! `Dragonfly` (Redis-compatible) cache for the usage statistics snapshot.
//!
//! The cache is advisory. Readers treat a missing or expired key as a miss
//! and recompute from the store.
//!
//! | Key | Value |
//! |-----|-------|
//! | `stats:usage` | JSON [`UsageStats`], expiring after the configured TTL |

use fred::prelude::*;
use fred::types::Expiration;

use scims_types::UsageStats;

use crate::error::DbError;

/// Key holding the latest usage snapshot.
pub const USAGE_STATS_KEY: &str = "stats:usage";

/// Client for the stats cache.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `url` (`redis://host:port[/db]`).
    ///
    /// # Errors
    ///
    /// [`DbError::Config`] for a malformed URL, [`DbError::Dragonfly`] when
    /// the server cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("bad dragonfly_url: {e}")))?;
        let client = Builder::from_config(config).build()?;
        client.init().await?;
        tracing::info!("stats cache connected");
        Ok(Self { client })
    }

    /// Store `stats`, replacing any previous snapshot. A zero TTL keeps it
    /// until the next write.
    ///
    /// # Errors
    ///
    /// [`DbError::Serialization`] or [`DbError::Dragonfly`].
    pub async fn put_usage_stats(&self, stats: &UsageStats, ttl_secs: u64) -> Result<(), DbError> {
        let json = serde_json::to_string(stats)?;
        let expiry = (ttl_secs > 0)
            .then(|| Expiration::EX(i64::try_from(ttl_secs).unwrap_or(i64::MAX)));
        let _: () = self
            .client
            .set(USAGE_STATS_KEY, json.as_str(), expiry, None, false)
            .await?;
        tracing::debug!(ttl_secs, generated_at = %stats.generated_at, "usage stats cached");
        Ok(())
    }

    /// The cached snapshot, or `None` on a miss.
    ///
    /// # Errors
    ///
    /// [`DbError::Dragonfly`] when the read fails, [`DbError::Serialization`]
    /// when the stored value is not a snapshot.
    pub async fn get_usage_stats(&self) -> Result<Option<UsageStats>, DbError> {
        let raw: Option<String> = self.client.get(USAGE_STATS_KEY).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(DbError::from))
            .transpose()
    }

    /// Drop the cached snapshot so the next read recomputes it.
    ///
    /// # Errors
    ///
    /// [`DbError::Dragonfly`] when the delete fails.
    pub async fn invalidate_usage_stats(&self) -> Result<(), DbError> {
        let _: u32 = self.client.del(USAGE_STATS_KEY).await?;
        Ok(())
    }
}
