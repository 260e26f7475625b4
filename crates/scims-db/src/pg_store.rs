//! `PostgreSQL` implementation of [`ScimsStore`].
//!
//! Every mutating operation is one transaction. Craft transitions lock the
//! craft row, then the stock rows they touch in key order, run the engine's
//! pure transition over those rows, and write the result back before
//! committing. A failed transition drops the transaction, so nothing it
//! staged (including placeholder stock rows) survives.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use scims_core::aggregator::TOP_BLUEPRINTS;
use scims_core::{
    CompletionOutcome, CraftRecord, LocationGraph, NewCraft, ReadyCraft, ScimsStore,
    StockAdjustment, StoreError, catalog, craft, gap, optimizer, resolver::Resolver,
};
use scims_ledger::{InvariantReport, StockKey, StockLedger, invariants::check_entries};
use scims_types::{
    Blueprint, BlueprintId, BlueprintUsage, CraftId, CraftStatus, FulfillmentStatus,
    IngredientGap, IngredientPlan, Item, ItemId, ItemStock, Location, LocationId, ResourceSource,
    ResourceSourceId, StockMovement, Suggestion, UsageStats, UserId,
};

use crate::error::DbError;
use crate::{catalog_store, craft_store, stock_store};

/// Everything the resolver needs for one requester.
struct PlanningContext {
    graph: LocationGraph,
    scope: BTreeSet<LocationId>,
    ledger: StockLedger,
    sources: Vec<ResourceSource>,
}

impl PlanningContext {
    async fn load(
        conn: &mut PgConnection,
        requester: UserId,
        items: &[Uuid],
    ) -> Result<Self, DbError> {
        let graph = LocationGraph::from_locations(catalog_store::fetch_locations(conn).await?);
        let scope = graph.access_scope(requester);
        let ledger = StockLedger::from_rows(stock_store::fetch_stock_for_items(conn, items).await?);
        let sources = catalog_store::fetch_sources_for_items(conn, items).await?;
        Ok(Self {
            graph,
            scope,
            ledger,
            sources,
        })
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.ledger, &self.sources, &self.graph, &self.scope)
    }
}

fn ingredient_items<'a, I>(blueprints: I) -> Vec<Uuid>
where
    I: IntoIterator<Item = &'a Blueprint>,
{
    blueprints
        .into_iter()
        .flat_map(|bp| bp.ingredients.iter().map(|i| i.item_id.into_inner()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn ensure_visible(blueprint: &Blueprint, requester: UserId) -> Result<(), StoreError> {
    if blueprint.is_visible_to(requester) {
        Ok(())
    } else {
        Err(StoreError::Forbidden(format!(
            "blueprint {} is private to another user",
            blueprint.id
        )))
    }
}

/// Stock keys currently reserved by `record`.
fn reserved_keys(record: &CraftRecord) -> BTreeSet<StockKey> {
    record
        .ingredients
        .iter()
        .filter(|i| i.status == FulfillmentStatus::Reserved)
        .flat_map(|i| {
            i.stock_allocations()
                .map(move |(location_id, _)| StockKey::new(i.item_id, location_id))
        })
        .collect()
}

/// Stock keys `record` would reserve on start.
fn planned_keys(record: &CraftRecord) -> BTreeSet<StockKey> {
    record
        .ingredients
        .iter()
        .flat_map(|i| {
            i.stock_allocations()
                .map(move |(location_id, _)| StockKey::new(i.item_id, location_id))
        })
        .collect()
}

/// Durable store backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connected pool. Migrations must already have run.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, DbError> {
        Ok(self.pool.begin().await?)
    }

    async fn conn(&self) -> Result<PoolConnection<Postgres>, DbError> {
        Ok(self.pool.acquire().await?)
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), DbError> {
        tx.commit().await?;
        Ok(())
    }

    /// Journal entries recorded for a craft, oldest first.
    pub async fn movements_for_craft(
        &self,
        craft_id: CraftId,
    ) -> Result<Vec<StockMovement>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(stock_store::movements_for_craft(&mut conn, craft_id.into_inner()).await?)
    }

    /// Run the ledger consistency check over every stored stock row.
    pub async fn verify_ledger(&self) -> Result<InvariantReport, StoreError> {
        let mut conn = self.conn().await?;
        let rows = stock_store::fetch_all_stock(&mut conn).await?;
        Ok(check_entries(&rows))
    }

    async fn lock_craft(tx: &mut PgConnection, id: CraftId) -> Result<CraftRecord, StoreError> {
        craft_store::fetch_craft(tx, id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("craft", id))
    }

    /// Lock the stock rows `keys` in key order, creating empty ones first.
    async fn lock_stock(
        tx: &mut PgConnection,
        keys: &BTreeSet<StockKey>,
        now: DateTime<Utc>,
    ) -> Result<StockLedger, DbError> {
        stock_store::ensure_rows(tx, keys, now).await?;
        Ok(StockLedger::from_rows(stock_store::lock_rows(tx, keys).await?))
    }

    /// Write the ledger's touched rows and journal back, then the craft.
    async fn persist_transition(
        tx: &mut PgConnection,
        record: &CraftRecord,
        ledger: &mut StockLedger,
        from: CraftStatus,
    ) -> Result<bool, DbError> {
        stock_store::write_rows(tx, ledger.touched_rows()).await?;
        let movements = ledger.take_movements();
        stock_store::insert_movements(tx, &movements).await?;
        craft_store::update_craft(tx, record, from).await
    }
}

impl ScimsStore for PgStore {
    async fn put_item(&self, mut item: Item) -> Result<Item, StoreError> {
        catalog::validate_item(&item)?;
        let mut tx = self.begin().await?;
        if let Some(existing) = catalog_store::fetch_item_for_update(&mut tx, item.id).await? {
            let reference = catalog_store::item_reference(&mut tx, item.id).await?;
            catalog::revise_item(&existing, &mut item, reference.as_deref())?;
        }
        catalog_store::upsert_item(&mut tx, &item).await?;
        Self::commit(tx).await?;
        Ok(item)
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, StoreError> {
        let mut conn = self.conn().await?;
        catalog_store::fetch_item(&mut conn, id)
            .await?
            .ok_or_else(|| StoreError::not_found("item", id))
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        if catalog_store::fetch_item(&mut tx, id).await?.is_none() {
            return Err(StoreError::not_found("item", id));
        }
        if let Some(reference) = catalog_store::item_reference(&mut tx, id).await? {
            return Err(StoreError::Conflict(format!(
                "item {id} is still referenced by a {reference}"
            )));
        }
        catalog_store::delete_item(&mut tx, id).await?;
        Self::commit(tx).await?;
        Ok(())
    }

    async fn put_location(&self, location: Location) -> Result<Location, StoreError> {
        let mut tx = self.begin().await?;
        catalog_store::lock_locations(&mut tx).await?;
        let graph = LocationGraph::from_locations(catalog_store::fetch_locations(&mut tx).await?);
        graph.validate(&location)?;
        catalog_store::upsert_location(&mut tx, &location).await?;
        Self::commit(tx).await?;
        Ok(location)
    }

    async fn get_location(&self, id: LocationId) -> Result<Location, StoreError> {
        let mut conn = self.conn().await?;
        catalog_store::fetch_location(&mut conn, id)
            .await?
            .ok_or_else(|| StoreError::not_found("location", id))
    }

    async fn accessible_locations(
        &self,
        requester: UserId,
    ) -> Result<BTreeSet<LocationId>, StoreError> {
        let mut conn = self.conn().await?;
        let graph =
            LocationGraph::from_locations(catalog_store::fetch_locations(&mut conn).await?);
        Ok(graph.access_scope(requester))
    }

    async fn get_stock(
        &self,
        item_id: ItemId,
        location_id: LocationId,
    ) -> Result<ItemStock, StoreError> {
        let mut conn = self.conn().await?;
        Ok(stock_store::fetch_stock(&mut conn, item_id, location_id)
            .await?
            .unwrap_or_else(|| ItemStock::empty(item_id, location_id)))
    }

    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<ItemStock, StoreError> {
        let mut tx = self.begin().await?;
        if catalog_store::fetch_item(&mut tx, adjustment.item_id)
            .await?
            .is_none()
        {
            return Err(StoreError::Validation(format!(
                "unknown item {}",
                adjustment.item_id
            )));
        }
        if catalog_store::fetch_location(&mut tx, adjustment.location_id)
            .await?
            .is_none()
        {
            return Err(StoreError::Validation(format!(
                "unknown location {}",
                adjustment.location_id
            )));
        }

        let keys = BTreeSet::from([StockKey::new(adjustment.item_id, adjustment.location_id)]);
        stock_store::ensure_rows(&mut tx, &keys, Utc::now()).await?;
        let mut ledger = StockLedger::from_rows(stock_store::lock_rows(&mut tx, &keys).await?);
        let row = ledger
            .adjust(
                adjustment.item_id,
                adjustment.location_id,
                adjustment.delta,
                &adjustment.reason,
            )?
            .clone();

        stock_store::write_rows(&mut tx, ledger.touched_rows()).await?;
        let movements = ledger.take_movements();
        stock_store::insert_movements(&mut tx, &movements).await?;
        Self::commit(tx).await?;
        Ok(row)
    }

    async fn put_blueprint(&self, mut blueprint: Blueprint) -> Result<Blueprint, StoreError> {
        catalog::validate_blueprint(&blueprint)?;
        let mut tx = self.begin().await?;

        if let Some(existing) =
            catalog_store::fetch_blueprint_for_update(&mut tx, blueprint.id).await?
        {
            catalog::revise_blueprint(&existing, &mut blueprint)?;
            catalog_store::update_blueprint_metadata(&mut tx, &blueprint).await?;
            Self::commit(tx).await?;
            return Ok(blueprint);
        }

        let mut referenced = ingredient_items([&blueprint]);
        referenced.push(blueprint.output_item_id.into_inner());
        let missing = catalog_store::missing_items(&mut tx, &referenced).await?;
        if let Some(unknown) = missing.first() {
            return Err(StoreError::Validation(format!("unknown item {unknown}")));
        }

        blueprint.usage_count = 0;
        catalog_store::insert_blueprint(&mut tx, &blueprint).await?;
        Self::commit(tx).await?;
        Ok(blueprint)
    }

    async fn get_blueprint(&self, id: BlueprintId) -> Result<Blueprint, StoreError> {
        let mut conn = self.conn().await?;
        catalog_store::fetch_blueprint(&mut conn, id)
            .await?
            .ok_or_else(|| StoreError::not_found("blueprint", id))
    }

    async fn put_resource_source(
        &self,
        source: ResourceSource,
    ) -> Result<ResourceSource, StoreError> {
        catalog::validate_resource_source(&source)?;
        let mut conn = self.conn().await?;
        if catalog_store::fetch_item(&mut conn, source.item_id)
            .await?
            .is_none()
        {
            return Err(StoreError::Validation(format!(
                "unknown item {}",
                source.item_id
            )));
        }
        if let Some(location_id) = source.location_id {
            if catalog_store::fetch_location(&mut conn, location_id)
                .await?
                .is_none()
            {
                return Err(StoreError::Validation(format!(
                    "unknown location {location_id}"
                )));
            }
        }
        catalog_store::upsert_source(&mut conn, &source).await?;
        Ok(source)
    }

    async fn verify_resource_source(
        &self,
        id: ResourceSourceId,
        confirmed: bool,
        now: DateTime<Utc>,
    ) -> Result<ResourceSource, StoreError> {
        let mut tx = self.begin().await?;
        let mut source = catalog_store::fetch_source_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::not_found("resource source", id))?;
        catalog::record_verification(&mut source, confirmed, now);
        catalog_store::update_verification(
            &mut tx,
            id,
            source.reliability_score,
            source.last_verified,
        )
        .await?;
        Self::commit(tx).await?;
        Ok(source)
    }

    async fn resolve(
        &self,
        blueprint_id: BlueprintId,
        requester: UserId,
        multiplier: u32,
    ) -> Result<Vec<IngredientPlan>, StoreError> {
        if multiplier == 0 {
            return Err(StoreError::Validation(String::from(
                "multiplier must be at least 1",
            )));
        }
        let mut conn = self.conn().await?;
        let blueprint = catalog_store::fetch_blueprint(&mut conn, blueprint_id)
            .await?
            .ok_or_else(|| StoreError::not_found("blueprint", blueprint_id))?;
        ensure_visible(&blueprint, requester)?;

        let items = ingredient_items([&blueprint]);
        let context = PlanningContext::load(&mut conn, requester, &items).await?;
        Ok(context.resolver().resolve(&blueprint, multiplier))
    }

    async fn suggest(
        &self,
        target_item: ItemId,
        target_quantity: Decimal,
        requester: UserId,
    ) -> Result<Vec<Suggestion>, StoreError> {
        if target_quantity <= Decimal::ZERO {
            return Err(StoreError::Validation(format!(
                "target quantity must be positive, got {target_quantity}"
            )));
        }
        let mut conn = self.conn().await?;
        let blueprints = catalog_store::fetch_blueprints_for_output(&mut conn, target_item).await?;
        let items = ingredient_items(&blueprints);
        let context = PlanningContext::load(&mut conn, requester, &items).await?;
        Ok(optimizer::suggest(
            target_item,
            target_quantity,
            requester,
            &blueprints,
            &context.resolver(),
        ))
    }

    async fn analyze_gaps(&self, craft_id: CraftId) -> Result<Vec<IngredientGap>, StoreError> {
        let mut conn = self.conn().await?;
        let record = craft_store::fetch_craft(&mut conn, craft_id, false)
            .await?
            .ok_or_else(|| StoreError::not_found("craft", craft_id))?;
        let items: Vec<Uuid> = record
            .ingredients
            .iter()
            .map(|i| i.item_id.into_inner())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let ledger =
            StockLedger::from_rows(stock_store::fetch_stock_for_items(&mut conn, &items).await?);
        let sources = catalog_store::fetch_sources_for_items(&mut conn, &items).await?;
        Ok(gap::analyze(&record, &ledger, &sources))
    }

    async fn create_craft(
        &self,
        request: NewCraft,
        now: DateTime<Utc>,
    ) -> Result<CraftRecord, StoreError> {
        let mut tx = self.begin().await?;
        if catalog_store::fetch_location(&mut tx, request.output_location_id)
            .await?
            .is_none()
        {
            return Err(StoreError::Validation(format!(
                "unknown location {}",
                request.output_location_id
            )));
        }
        let blueprint = catalog_store::fetch_blueprint(&mut tx, request.blueprint_id)
            .await?
            .ok_or_else(|| StoreError::not_found("blueprint", request.blueprint_id))?;
        ensure_visible(&blueprint, request.requester_id)?;

        let items = ingredient_items([&blueprint]);
        let context = PlanningContext::load(&mut tx, request.requester_id, &items).await?;
        let plans = context.resolver().resolve(&blueprint, 1);
        let record = craft::plan_craft(&request, plans, now);

        craft_store::insert_craft(&mut tx, &record).await?;
        Self::commit(tx).await?;
        tracing::info!(
            craft_id = %record.id(),
            blueprint_id = %request.blueprint_id,
            requester_id = %request.requester_id,
            "craft planned"
        );
        Ok(record)
    }

    async fn get_craft(&self, id: CraftId) -> Result<CraftRecord, StoreError> {
        let mut conn = self.conn().await?;
        craft_store::fetch_craft(&mut conn, id, false)
            .await?
            .ok_or_else(|| StoreError::not_found("craft", id))
    }

    async fn start_craft(&self, id: CraftId, now: DateTime<Utc>) -> Result<CraftRecord, StoreError> {
        let mut tx = self.begin().await?;
        let mut record = Self::lock_craft(&mut tx, id).await?;
        let keys = if record.status() == CraftStatus::Planned {
            planned_keys(&record)
        } else {
            BTreeSet::new()
        };
        let mut ledger = Self::lock_stock(&mut tx, &keys, now).await?;
        let from = record.status();
        craft::start_craft(&mut record, &mut ledger, now)?;

        if !Self::persist_transition(&mut tx, &record, &mut ledger, from).await? {
            return Err(StoreError::Conflict(format!(
                "craft {id} changed while starting"
            )));
        }
        Self::commit(tx).await?;
        Ok(record)
    }

    async fn complete_craft(
        &self,
        id: CraftId,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut tx = self.begin().await?;
        let mut record = Self::lock_craft(&mut tx, id).await?;
        let blueprint_id = record.craft.blueprint_id;
        let blueprint = catalog_store::fetch_blueprint(&mut tx, blueprint_id)
            .await?
            .ok_or_else(|| StoreError::not_found("blueprint", blueprint_id))?;

        let mut keys = BTreeSet::new();
        if record.status() == CraftStatus::InProgress {
            keys = reserved_keys(&record);
            keys.insert(StockKey::new(
                blueprint.output_item_id,
                record.craft.output_location_id,
            ));
        }
        let mut ledger = Self::lock_stock(&mut tx, &keys, now).await?;

        let from = record.status();
        let outcome = craft::complete_craft(&mut record, &blueprint, &mut ledger, now)?;
        if !outcome.is_completed_now() {
            return Ok(outcome);
        }

        if !Self::persist_transition(&mut tx, &record, &mut ledger, from).await? {
            return Ok(CompletionOutcome::AlreadyCompleted { craft_id: id });
        }
        catalog_store::increment_usage(&mut tx, blueprint_id).await?;
        Self::commit(tx).await?;
        Ok(outcome)
    }

    async fn cancel_craft(&self, id: CraftId, now: DateTime<Utc>) -> Result<CraftRecord, StoreError> {
        let mut tx = self.begin().await?;
        let mut record = Self::lock_craft(&mut tx, id).await?;
        let keys = if record.status().is_terminal() {
            BTreeSet::new()
        } else {
            reserved_keys(&record)
        };
        let mut ledger = Self::lock_stock(&mut tx, &keys, now).await?;
        let from = record.status();
        craft::cancel_craft(&mut record, &mut ledger, now)?;

        if !Self::persist_transition(&mut tx, &record, &mut ledger, from).await? {
            return Err(StoreError::Conflict(format!(
                "craft {id} changed while cancelling"
            )));
        }
        Self::commit(tx).await?;
        Ok(record)
    }

    async fn ready_crafts(&self, now: DateTime<Utc>) -> Result<Vec<ReadyCraft>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(craft_store::ready_crafts(&mut conn, now).await?)
    }

    async fn usage_stats(&self, now: DateTime<Utc>) -> Result<UsageStats, StoreError> {
        let mut conn = self.conn().await?;
        let counts = craft_store::status_counts(&mut conn).await?;
        let since = TimeDelta::try_hours(24)
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(now);
        let completed_last_24h = craft_store::completed_since(&mut conn, since).await?;
        let top_blueprints = catalog_store::top_blueprints(&mut conn, TOP_BLUEPRINTS)
            .await?
            .into_iter()
            .map(|(id, name, usage)| BlueprintUsage {
                blueprint_id: id.into(),
                name,
                usage_count: u64::try_from(usage).unwrap_or(0),
            })
            .collect();
        let outstanding_reserved = stock_store::total_reserved(&mut conn).await?;

        Ok(UsageStats {
            generated_at: now,
            planned: counts.planned,
            in_progress: counts.in_progress,
            completed: counts.completed,
            cancelled: counts.cancelled,
            completed_last_24h,
            top_blueprints,
            outstanding_reserved,
        })
    }
}
