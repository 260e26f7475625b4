//! The persistence contract shared by the in-memory and `PostgreSQL` stores.
//!
//! Each method is one unit of work: it either commits entirely or leaves
//! the store unchanged. Craft transitions run the pure functions in
//! [`crate::craft`] against the rows they touch, holding whatever lock the
//! backend uses for the duration of the call only.

use std::collections::BTreeSet;
use std::future::Future;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use scims_types::{
    Blueprint, BlueprintId, CraftId, IngredientGap, IngredientPlan, Item, ItemId, ItemStock,
    Location, LocationId, ResourceSource, ResourceSourceId, Suggestion, UsageStats, UserId,
};

use crate::craft::{CompletionOutcome, CraftRecord, NewCraft};
use crate::error::StoreError;

/// A manual stock correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    /// Item adjusted.
    pub item_id: ItemId,
    /// Location adjusted.
    pub location_id: LocationId,
    /// Signed change to `quantity`. Must not be zero.
    pub delta: Decimal,
    /// Free-form reason recorded in the movement journal.
    pub reason: String,
}

/// A craft that is due for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyCraft {
    /// The craft.
    pub craft_id: CraftId,
    /// Scheduling priority.
    pub priority: i32,
    /// When the crafting time elapsed.
    pub ready_at: DateTime<Utc>,
}

/// Sort ready crafts: priority descending, then longest waiting first.
pub fn order_ready(crafts: &mut [ReadyCraft]) {
    crafts.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.ready_at.cmp(&b.ready_at))
            .then_with(|| a.craft_id.cmp(&b.craft_id))
    });
}

/// Storage and engine operations behind the API and the scheduler.
pub trait ScimsStore: Send + Sync + 'static {
    // -- catalog ------------------------------------------------------------

    /// Insert an item, or edit one nothing references yet. Editing a
    /// referenced item is a [`StoreError::Conflict`].
    fn put_item(&self, item: Item) -> impl Future<Output = Result<Item, StoreError>> + Send;

    /// Fetch an item.
    fn get_item(&self, id: ItemId) -> impl Future<Output = Result<Item, StoreError>> + Send;

    /// Delete an item. Fails with [`StoreError::Conflict`] while stock,
    /// blueprints or resource sources still reference it.
    fn delete_item(&self, id: ItemId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Insert or replace a location after cycle checking.
    fn put_location(
        &self,
        location: Location,
    ) -> impl Future<Output = Result<Location, StoreError>> + Send;

    /// Fetch a location.
    fn get_location(
        &self,
        id: LocationId,
    ) -> impl Future<Output = Result<Location, StoreError>> + Send;

    /// Locations whose stock `requester` may draw on.
    fn accessible_locations(
        &self,
        requester: UserId,
    ) -> impl Future<Output = Result<BTreeSet<LocationId>, StoreError>> + Send;

    /// Stock row for `(item, location)`; an empty row when none exists.
    fn get_stock(
        &self,
        item_id: ItemId,
        location_id: LocationId,
    ) -> impl Future<Output = Result<ItemStock, StoreError>> + Send;

    /// Apply a manual adjustment and journal it.
    fn adjust_stock(
        &self,
        adjustment: StockAdjustment,
    ) -> impl Future<Output = Result<ItemStock, StoreError>> + Send;

    /// Insert a blueprint after validation.
    ///
    /// Re-putting an existing id may only change `name` and `visibility`,
    /// and only with the stored owner: another owner is
    /// [`StoreError::Forbidden`], a structural change is
    /// [`StoreError::Conflict`].
    fn put_blueprint(
        &self,
        blueprint: Blueprint,
    ) -> impl Future<Output = Result<Blueprint, StoreError>> + Send;

    /// Fetch a blueprint.
    fn get_blueprint(
        &self,
        id: BlueprintId,
    ) -> impl Future<Output = Result<Blueprint, StoreError>> + Send;

    /// Insert or replace a resource source after validation.
    fn put_resource_source(
        &self,
        source: ResourceSource,
    ) -> impl Future<Output = Result<ResourceSource, StoreError>> + Send;

    /// Record a verification outcome for a resource source.
    fn verify_resource_source(
        &self,
        id: ResourceSourceId,
        confirmed: bool,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<ResourceSource, StoreError>> + Send;

    // -- planning -----------------------------------------------------------

    /// Resolve a blueprint for `requester` without creating anything.
    fn resolve(
        &self,
        blueprint_id: BlueprintId,
        requester: UserId,
        multiplier: u32,
    ) -> impl Future<Output = Result<Vec<IngredientPlan>, StoreError>> + Send;

    /// Rank blueprints that produce `target_quantity` of `target_item`.
    fn suggest(
        &self,
        target_item: ItemId,
        target_quantity: Decimal,
        requester: UserId,
    ) -> impl Future<Output = Result<Vec<Suggestion>, StoreError>> + Send;

    /// Gap analysis for a craft.
    fn analyze_gaps(
        &self,
        craft_id: CraftId,
    ) -> impl Future<Output = Result<Vec<IngredientGap>, StoreError>> + Send;

    // -- crafts -------------------------------------------------------------

    /// Resolve and persist a new `planned` craft.
    fn create_craft(
        &self,
        request: NewCraft,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<CraftRecord, StoreError>> + Send;

    /// Fetch a craft with its ingredients.
    fn get_craft(
        &self,
        id: CraftId,
    ) -> impl Future<Output = Result<CraftRecord, StoreError>> + Send;

    /// `planned -> in_progress`.
    fn start_craft(
        &self,
        id: CraftId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<CraftRecord, StoreError>> + Send;

    /// `in_progress -> completed`; idempotent on completed crafts.
    fn complete_craft(
        &self,
        id: CraftId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<CompletionOutcome, StoreError>> + Send;

    /// `planned | in_progress -> cancelled`.
    fn cancel_craft(
        &self,
        id: CraftId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<CraftRecord, StoreError>> + Send;

    // -- aggregation --------------------------------------------------------

    /// In-progress crafts whose crafting time has elapsed at `now`, in
    /// completion order.
    fn ready_crafts(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ReadyCraft>, StoreError>> + Send;

    /// Usage statistics snapshot.
    fn usage_stats(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<UsageStats, StoreError>> + Send;
}
