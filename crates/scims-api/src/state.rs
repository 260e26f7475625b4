//! Shared application state for the API server.

use std::sync::Arc;

use scims_core::ScimsStore;
use scims_db::DragonflyPool;

/// State shared by every handler: the store and the optional stats cache.
pub struct AppState<S: ScimsStore> {
    /// Engine and persistence.
    pub store: Arc<S>,
    /// Cache for `GET /api/stats`; `None` computes every request.
    pub stats_cache: Option<DragonflyPool>,
    /// TTL applied when the handler fills the cache.
    pub stats_ttl_secs: u64,
}

impl<S: ScimsStore> AppState<S> {
    /// State without a stats cache.
    pub const fn new(store: Arc<S>) -> Self {
        Self {
            store,
            stats_cache: None,
            stats_ttl_secs: 0,
        }
    }

    /// Serve `GET /api/stats` through `cache`.
    #[must_use]
    pub fn with_stats_cache(mut self, cache: DragonflyPool, ttl_secs: u64) -> Self {
        self.stats_cache = Some(cache);
        self.stats_ttl_secs = ttl_secs;
        self
    }
}
