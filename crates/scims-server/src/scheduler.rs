//! Periodic jobs: completing ready crafts and refreshing usage stats.
//!
//! Each job runs on its own [`tokio::time::interval`]. A failed tick is
//! logged and the next tick runs as usual; nothing here stops the service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use scims_core::ScimsStore;
use scims_core::aggregator::{PassReport, aggregate_usage_stats, complete_ready_crafts};
use scims_core::config::SchedulerConfig;
use scims_db::DragonflyPool;
use scims_types::UsageStats;

/// Drives the periodic entry points against one store.
pub struct Scheduler<S: ScimsStore> {
    store: Arc<S>,
    cache: Option<DragonflyPool>,
    stats_ttl_secs: u64,
    config: SchedulerConfig,
}

impl<S: ScimsStore> Scheduler<S> {
    /// Scheduler over `store`; stats are cached when `cache` is set.
    pub const fn new(
        store: Arc<S>,
        cache: Option<DragonflyPool>,
        stats_ttl_secs: u64,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            stats_ttl_secs,
            config,
        }
    }

    /// Spawn both job loops. Returns no handles when disabled.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        if !self.config.enabled {
            tracing::info!("Scheduler disabled");
            return Vec::new();
        }

        let this = Arc::new(self);
        let completion = {
            let this = Arc::clone(&this);
            let period = period(this.config.complete_interval_secs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    this.completion_tick().await;
                }
            })
        };
        let stats = {
            let this = Arc::clone(&this);
            let period = period(this.config.stats_interval_secs);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    this.stats_tick().await;
                }
            })
        };

        tracing::info!(
            complete_interval_secs = this.config.complete_interval_secs,
            stats_interval_secs = this.config.stats_interval_secs,
            "Scheduler started"
        );
        vec![completion, stats]
    }

    /// One completion pass. `None` when listing ready crafts failed.
    pub async fn completion_tick(&self) -> Option<PassReport> {
        match complete_ready_crafts(self.store.as_ref(), Utc::now()).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "completion pass failed");
                None
            }
        }
    }

    /// One stats refresh, written to the cache when configured.
    pub async fn stats_tick(&self) -> Option<UsageStats> {
        let stats = match aggregate_usage_stats(self.store.as_ref(), Utc::now()).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "usage stats aggregation failed");
                return None;
            }
        };
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put_usage_stats(&stats, self.stats_ttl_secs).await {
                tracing::warn!(error = %e, "failed to cache usage stats");
            }
        }
        Some(stats)
    }
}

/// Interval length; `tokio::time::interval` rejects zero.
fn period(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Duration as TimeDelta;
    use rust_decimal_macros::dec;

    use scims_core::{MemoryStore, NewCraft, StockAdjustment};
    use scims_types::{
        Blueprint, BlueprintId, BlueprintIngredient, Item, ItemId, ItemRarity, Location,
        LocationId, LocationType, OwnerType, UserId, Visibility,
    };

    use super::*;

    fn item(name: &str) -> Item {
        Item {
            id: ItemId::new(),
            name: name.to_owned(),
            category: String::from("component"),
            subcategory: None,
            rarity: ItemRarity::Common,
            attributes: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// A started Widget craft whose crafting time elapsed half an hour ago.
    async fn store_with_elapsed_craft() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        let hangar = store
            .put_location(Location {
                id: LocationId::new(),
                name: String::from("Hangar"),
                location_type: LocationType::Station,
                owner_type: OwnerType::User,
                owner_id: Some(user.into_inner()),
                parent_location_id: None,
                canonical_location_id: None,
                priority: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
            .id;
        let metal = store.put_item(item("Metal")).await.unwrap().id;
        let widget = store.put_item(item("Widget")).await.unwrap().id;
        store
            .adjust_stock(StockAdjustment {
                item_id: metal,
                location_id: hangar,
                delta: dec!(100),
                reason: String::from("initial count"),
            })
            .await
            .unwrap();
        let blueprint = store
            .put_blueprint(Blueprint {
                id: BlueprintId::new(),
                name: String::from("Widget"),
                output_item_id: widget,
                output_quantity: dec!(1),
                crafting_time_minutes: 10,
                ingredients: vec![BlueprintIngredient {
                    item_id: metal,
                    quantity: dec!(30),
                    optional: false,
                }],
                visibility: Visibility::Public,
                owner_id: Some(user),
                usage_count: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let earlier = Utc::now() - TimeDelta::minutes(40);
        let craft = store
            .create_craft(
                NewCraft {
                    blueprint_id: blueprint.id,
                    requester_id: user,
                    organization_id: None,
                    priority: 0,
                    scheduled_start: None,
                    output_location_id: hangar,
                },
                earlier,
            )
            .await
            .unwrap();
        store.start_craft(craft.id(), earlier).await.unwrap();
        store
    }

    fn scheduler(store: Arc<MemoryStore>) -> Scheduler<MemoryStore> {
        Scheduler::new(store, None, 60, SchedulerConfig::default())
    }

    #[tokio::test]
    async fn completion_tick_finishes_elapsed_crafts() {
        let scheduler = scheduler(store_with_elapsed_craft().await);
        let report = scheduler.completion_tick().await.unwrap();
        assert_eq!(report.completed.len(), 1);
        assert!(report.failed.is_empty());

        let again = scheduler.completion_tick().await.unwrap();
        assert_eq!(again.examined(), 0);
    }

    #[tokio::test]
    async fn stats_tick_without_cache_still_aggregates() {
        let scheduler = scheduler(store_with_elapsed_craft().await);
        let stats = scheduler.stats_tick().await.unwrap();
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.outstanding_reserved, dec!(30));
    }

    #[tokio::test]
    async fn disabled_scheduler_spawns_nothing() {
        let config = SchedulerConfig {
            enabled: false,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(Arc::new(MemoryStore::new()), None, 60, config);
        assert!(scheduler.spawn().is_empty());
    }

    #[test]
    fn zero_period_is_clamped() {
        assert_eq!(period(0), Duration::from_secs(1));
    }
}
