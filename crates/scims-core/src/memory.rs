//! In-memory [`ScimsStore`] implementation.
//!
//! All state sits behind one [`tokio::sync::Mutex`], so every operation is
//! serialized and trivially atomic. Used for tests, demos, and single-node
//! deployments that do not need durability.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use scims_ledger::{InvariantReport, StockLedger};
use scims_types::{
    Blueprint, BlueprintId, CraftId, CraftStatus, IngredientGap, IngredientPlan, Item, ItemId,
    ItemStock, Location, LocationId, ResourceSource, ResourceSourceId, StockMovement, Suggestion,
    UsageStats, UserId,
};

use crate::aggregator::compute_usage_stats;
use crate::catalog;
use crate::craft::{self, CompletionOutcome, CraftRecord, NewCraft};
use crate::error::StoreError;
use crate::gap;
use crate::location::LocationGraph;
use crate::optimizer;
use crate::resolver::Resolver;
use crate::store::{ReadyCraft, ScimsStore, StockAdjustment, order_ready};

#[derive(Debug, Default)]
struct MemoryState {
    items: BTreeMap<ItemId, Item>,
    locations: LocationGraph,
    ledger: StockLedger,
    journal: Vec<StockMovement>,
    blueprints: BTreeMap<BlueprintId, Blueprint>,
    sources: BTreeMap<ResourceSourceId, ResourceSource>,
    crafts: BTreeMap<CraftId, CraftRecord>,
}

impl MemoryState {
    fn flush_journal(&mut self) {
        let movements = self.ledger.take_movements();
        self.journal.extend(movements);
    }

    fn source_list(&self) -> Vec<ResourceSource> {
        self.sources.values().cloned().collect()
    }

    fn visible_blueprint(
        &self,
        id: BlueprintId,
        requester: UserId,
    ) -> Result<&Blueprint, StoreError> {
        let blueprint = self
            .blueprints
            .get(&id)
            .ok_or_else(|| StoreError::not_found("blueprint", id))?;
        if blueprint.is_visible_to(requester) {
            Ok(blueprint)
        } else {
            Err(StoreError::Forbidden(format!(
                "blueprint {id} is private to another user"
            )))
        }
    }

    /// What still references an item, if anything.
    fn item_reference(&self, id: ItemId) -> Option<&'static str> {
        if self.ledger.rows_for_item(id).next().is_some() {
            return Some("stock row");
        }
        if self.journal.iter().any(|m| m.item_id == id) {
            return Some("stock movement");
        }
        let in_blueprint = self.blueprints.values().any(|bp| {
            bp.output_item_id == id || bp.ingredients.iter().any(|i| i.item_id == id)
        });
        if in_blueprint {
            return Some("blueprint");
        }
        if self
            .crafts
            .values()
            .any(|c| c.ingredients.iter().any(|i| i.item_id == id))
        {
            return Some("craft");
        }
        self.sources
            .values()
            .any(|s| s.item_id == id)
            .then_some("resource source")
    }

    fn require_item(&self, id: ItemId) -> Result<(), StoreError> {
        if self.items.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::Validation(format!("unknown item {id}")))
        }
    }

    fn require_location(&self, id: LocationId) -> Result<(), StoreError> {
        if self.locations.contains(id) {
            Ok(())
        } else {
            Err(StoreError::Validation(format!("unknown location {id}")))
        }
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stock movement journaled so far, oldest first.
    pub async fn movements(&self) -> Vec<StockMovement> {
        self.state.lock().await.journal.clone()
    }

    /// Run the ledger consistency check over every stock row.
    pub async fn verify_ledger(&self) -> InvariantReport {
        self.state.lock().await.ledger.verify()
    }
}

impl ScimsStore for MemoryStore {
    async fn put_item(&self, mut item: Item) -> Result<Item, StoreError> {
        catalog::validate_item(&item)?;
        let mut state = self.state.lock().await;
        if let Some(existing) = state.items.get(&item.id) {
            let reference = state.item_reference(item.id);
            catalog::revise_item(existing, &mut item, reference)?;
        }
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_item(&self, id: ItemId) -> Result<Item, StoreError> {
        let state = self.state.lock().await;
        state
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("item", id))
    }

    async fn delete_item(&self, id: ItemId) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.items.contains_key(&id) {
            return Err(StoreError::not_found("item", id));
        }
        if let Some(reference) = state.item_reference(id) {
            return Err(StoreError::Conflict(format!(
                "item {id} is still referenced by a {reference}"
            )));
        }
        state.items.remove(&id);
        Ok(())
    }

    async fn put_location(&self, location: Location) -> Result<Location, StoreError> {
        let mut state = self.state.lock().await;
        state.locations.insert(location.clone())?;
        Ok(location)
    }

    async fn get_location(&self, id: LocationId) -> Result<Location, StoreError> {
        let state = self.state.lock().await;
        state
            .locations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("location", id))
    }

    async fn accessible_locations(
        &self,
        requester: UserId,
    ) -> Result<BTreeSet<LocationId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.locations.access_scope(requester))
    }

    async fn get_stock(
        &self,
        item_id: ItemId,
        location_id: LocationId,
    ) -> Result<ItemStock, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .ledger
            .get(item_id, location_id)
            .cloned()
            .unwrap_or_else(|| ItemStock::empty(item_id, location_id)))
    }

    async fn adjust_stock(&self, adjustment: StockAdjustment) -> Result<ItemStock, StoreError> {
        let mut state = self.state.lock().await;
        state.require_item(adjustment.item_id)?;
        state.require_location(adjustment.location_id)?;
        let row = state
            .ledger
            .adjust(
                adjustment.item_id,
                adjustment.location_id,
                adjustment.delta,
                &adjustment.reason,
            )?
            .clone();
        state.flush_journal();
        Ok(row)
    }

    async fn put_blueprint(&self, mut blueprint: Blueprint) -> Result<Blueprint, StoreError> {
        catalog::validate_blueprint(&blueprint)?;
        let mut state = self.state.lock().await;
        state.require_item(blueprint.output_item_id)?;
        for ingredient in &blueprint.ingredients {
            state.require_item(ingredient.item_id)?;
        }
        if let Some(existing) = state.blueprints.get(&blueprint.id) {
            catalog::revise_blueprint(existing, &mut blueprint)?;
        }
        state.blueprints.insert(blueprint.id, blueprint.clone());
        Ok(blueprint)
    }

    async fn get_blueprint(&self, id: BlueprintId) -> Result<Blueprint, StoreError> {
        let state = self.state.lock().await;
        state
            .blueprints
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("blueprint", id))
    }

    async fn put_resource_source(
        &self,
        source: ResourceSource,
    ) -> Result<ResourceSource, StoreError> {
        catalog::validate_resource_source(&source)?;
        let mut state = self.state.lock().await;
        state.require_item(source.item_id)?;
        if let Some(location_id) = source.location_id {
            state.require_location(location_id)?;
        }
        state.sources.insert(source.id, source.clone());
        Ok(source)
    }

    async fn verify_resource_source(
        &self,
        id: ResourceSourceId,
        confirmed: bool,
        now: DateTime<Utc>,
    ) -> Result<ResourceSource, StoreError> {
        let mut state = self.state.lock().await;
        let source = state
            .sources
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("resource source", id))?;
        catalog::record_verification(source, confirmed, now);
        Ok(source.clone())
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
        let state = self.state.lock().await;
        let blueprint = state.visible_blueprint(blueprint_id, requester)?;
        let sources = state.source_list();
        let scope = state.locations.access_scope(requester);
        let resolver = Resolver::new(&state.ledger, &sources, &state.locations, &scope);
        Ok(resolver.resolve(blueprint, multiplier))
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
        let state = self.state.lock().await;
        let blueprints: Vec<Blueprint> = state.blueprints.values().cloned().collect();
        let sources = state.source_list();
        let scope = state.locations.access_scope(requester);
        let resolver = Resolver::new(&state.ledger, &sources, &state.locations, &scope);
        Ok(optimizer::suggest(
            target_item,
            target_quantity,
            requester,
            &blueprints,
            &resolver,
        ))
    }

    async fn analyze_gaps(&self, craft_id: CraftId) -> Result<Vec<IngredientGap>, StoreError> {
        let state = self.state.lock().await;
        let record = state
            .crafts
            .get(&craft_id)
            .ok_or_else(|| StoreError::not_found("craft", craft_id))?;
        let sources = state.source_list();
        Ok(gap::analyze(record, &state.ledger, &sources))
    }

    async fn create_craft(
        &self,
        request: NewCraft,
        now: DateTime<Utc>,
    ) -> Result<CraftRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.require_location(request.output_location_id)?;
        let blueprint = state.visible_blueprint(request.blueprint_id, request.requester_id)?;
        let sources = state.source_list();
        let scope = state.locations.access_scope(request.requester_id);
        let plans =
            Resolver::new(&state.ledger, &sources, &state.locations, &scope).resolve(blueprint, 1);

        let record = craft::plan_craft(&request, plans, now);
        tracing::info!(
            craft_id = %record.id(),
            blueprint_id = %request.blueprint_id,
            requester_id = %request.requester_id,
            "craft planned"
        );
        state.crafts.insert(record.id(), record.clone());
        Ok(record)
    }

    async fn get_craft(&self, id: CraftId) -> Result<CraftRecord, StoreError> {
        let state = self.state.lock().await;
        state
            .crafts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("craft", id))
    }

    async fn start_craft(&self, id: CraftId, now: DateTime<Utc>) -> Result<CraftRecord, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let record = state
            .crafts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("craft", id))?;
        craft::start_craft(record, &mut state.ledger, now)?;
        let updated = record.clone();
        state.flush_journal();
        Ok(updated)
    }

    async fn complete_craft(
        &self,
        id: CraftId,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let record = state
            .crafts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("craft", id))?;
        let blueprint_id = record.craft.blueprint_id;
        let blueprint = state
            .blueprints
            .get(&blueprint_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("blueprint", blueprint_id))?;

        let outcome = craft::complete_craft(record, &blueprint, &mut state.ledger, now)?;
        if outcome.is_completed_now() {
            if let Some(stored) = state.blueprints.get_mut(&blueprint_id) {
                stored.usage_count = stored.usage_count.saturating_add(1);
            }
        }
        state.flush_journal();
        Ok(outcome)
    }

    async fn cancel_craft(&self, id: CraftId, now: DateTime<Utc>) -> Result<CraftRecord, StoreError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let record = state
            .crafts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("craft", id))?;
        craft::cancel_craft(record, &mut state.ledger, now)?;
        let updated = record.clone();
        state.flush_journal();
        Ok(updated)
    }

    async fn ready_crafts(&self, now: DateTime<Utc>) -> Result<Vec<ReadyCraft>, StoreError> {
        let state = self.state.lock().await;
        let mut ready: Vec<ReadyCraft> = state
            .crafts
            .values()
            .filter(|r| r.status() == CraftStatus::InProgress)
            .filter_map(|r| {
                let minutes = state
                    .blueprints
                    .get(&r.craft.blueprint_id)?
                    .crafting_time_minutes;
                let ready_at = r.ready_at(minutes)?;
                (ready_at <= now).then_some(ReadyCraft {
                    craft_id: r.id(),
                    priority: r.craft.priority,
                    ready_at,
                })
            })
            .collect();
        order_ready(&mut ready);
        Ok(ready)
    }

    async fn usage_stats(&self, now: DateTime<Utc>) -> Result<UsageStats, StoreError> {
        let state = self.state.lock().await;
        let blueprints: Vec<Blueprint> = state.blueprints.values().cloned().collect();
        Ok(compute_usage_stats(
            state.crafts.values().map(|r| &r.craft),
            &blueprints,
            state.ledger.total_reserved(),
            now,
        ))
    }
}
