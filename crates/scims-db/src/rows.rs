//! Row types for every table and their conversions into domain types.
//!
//! Enum-like columns are stored as `TEXT`; decoding goes through the
//! [`FromStr`](core::str::FromStr) impls in `scims-types` and fails with
//! [`DbError::Decode`] on unknown values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use uuid::Uuid;

use scims_types::{
    Allocation, Blueprint, BlueprintIngredient, Craft, CraftIngredient, Item, ItemStock, Location,
    ResourceSource, StockMovement, UserId,
};

use crate::error::DbError;

/// A row from the `items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    /// Item UUID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Category.
    pub category: String,
    /// Optional subcategory.
    pub subcategory: Option<String>,
    /// Rarity as text.
    pub rarity: String,
    /// Free-form attributes.
    pub attributes: Json<BTreeMap<String, String>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for Item {
    type Error = DbError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            name: row.name,
            category: row.category,
            subcategory: row.subcategory,
            rarity: row.rarity.parse()?,
            attributes: row.attributes.0,
            created_at: row.created_at,
        })
    }
}

/// A row from the `locations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LocationRow {
    /// Location UUID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Location type as text.
    pub location_type: String,
    /// Owner type as text.
    pub owner_type: String,
    /// Owning user or organization.
    pub owner_id: Option<Uuid>,
    /// Containing location.
    pub parent_location_id: Option<Uuid>,
    /// Shared world counterpart.
    pub canonical_location_id: Option<Uuid>,
    /// Draw priority.
    pub priority: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LocationRow> for Location {
    type Error = DbError;

    fn try_from(row: LocationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            name: row.name,
            location_type: row.location_type.parse()?,
            owner_type: row.owner_type.parse()?,
            owner_id: row.owner_id,
            parent_location_id: row.parent_location_id.map(Into::into),
            canonical_location_id: row.canonical_location_id.map(Into::into),
            priority: row.priority,
            created_at: row.created_at,
        })
    }
}

/// A row from the `item_stock` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StockRow {
    /// Item UUID.
    pub item_id: Uuid,
    /// Location UUID.
    pub location_id: Uuid,
    /// Total quantity.
    pub quantity: Decimal,
    /// Reserved quantity.
    pub reserved_quantity: Decimal,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<StockRow> for ItemStock {
    fn from(row: StockRow) -> Self {
        Self {
            item_id: row.item_id.into(),
            location_id: row.location_id.into(),
            quantity: row.quantity,
            reserved_quantity: row.reserved_quantity,
            updated_at: row.updated_at,
        }
    }
}

/// A row from the `blueprints` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BlueprintRow {
    /// Blueprint UUID.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Output item UUID.
    pub output_item_id: Uuid,
    /// Output per craft.
    pub output_quantity: Decimal,
    /// Minutes per craft.
    pub crafting_time_minutes: i32,
    /// Visibility as text.
    pub visibility: String,
    /// Owning user.
    pub owner_id: Option<Uuid>,
    /// Completed crafts.
    pub usage_count: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A row from the `blueprint_ingredients` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BlueprintIngredientRow {
    /// Owning blueprint.
    pub blueprint_id: Uuid,
    /// Ingredient item.
    pub item_id: Uuid,
    /// Quantity per craft.
    pub quantity: Decimal,
    /// Whether the ingredient may be skipped.
    pub optional: bool,
}

impl BlueprintRow {
    /// Combine with the blueprint's ingredient rows (already in position
    /// order).
    pub fn into_blueprint(
        self,
        ingredients: Vec<BlueprintIngredientRow>,
    ) -> Result<Blueprint, DbError> {
        Ok(Blueprint {
            id: self.id.into(),
            name: self.name,
            output_item_id: self.output_item_id.into(),
            output_quantity: self.output_quantity,
            crafting_time_minutes: u32::try_from(self.crafting_time_minutes).map_err(|e| {
                DbError::Decode(format!(
                    "invalid crafting time {}: {e}",
                    self.crafting_time_minutes
                ))
            })?,
            ingredients: ingredients
                .into_iter()
                .map(|i| BlueprintIngredient {
                    item_id: i.item_id.into(),
                    quantity: i.quantity,
                    optional: i.optional,
                })
                .collect(),
            visibility: self.visibility.parse()?,
            owner_id: self.owner_id.map(UserId::from),
            usage_count: u64::try_from(self.usage_count).unwrap_or(0),
            created_at: self.created_at,
        })
    }
}

/// A row from the `resource_sources` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResourceSourceRow {
    /// Source UUID.
    pub id: Uuid,
    /// Item offered.
    pub item_id: Uuid,
    /// Source type as text.
    pub source_type: String,
    /// Where it is.
    pub location_id: Option<Uuid>,
    /// Who provides it.
    pub provider_id: Option<Uuid>,
    /// Quantity on offer.
    pub available_quantity: Decimal,
    /// Price per unit.
    pub cost_per_unit: Option<Decimal>,
    /// Reliability in `[0, 1]`.
    pub reliability_score: Decimal,
    /// Last verification.
    pub last_verified: Option<DateTime<Utc>>,
}

impl TryFrom<ResourceSourceRow> for ResourceSource {
    type Error = DbError;

    fn try_from(row: ResourceSourceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            item_id: row.item_id.into(),
            source_type: row.source_type.parse()?,
            location_id: row.location_id.map(Into::into),
            provider_id: row.provider_id.map(Into::into),
            available_quantity: row.available_quantity,
            cost_per_unit: row.cost_per_unit,
            reliability_score: row.reliability_score,
            last_verified: row.last_verified,
        })
    }
}

/// A row from the `crafts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CraftRow {
    /// Craft UUID.
    pub id: Uuid,
    /// Blueprint executed.
    pub blueprint_id: Uuid,
    /// Requesting user.
    pub requester_id: Uuid,
    /// Organization, if any.
    pub organization_id: Option<Uuid>,
    /// Status as text.
    pub status: String,
    /// Scheduling priority.
    pub priority: i32,
    /// Earliest start.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Start timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// Output location.
    pub output_location_id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CraftRow> for Craft {
    type Error = DbError;

    fn try_from(row: CraftRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            blueprint_id: row.blueprint_id.into(),
            requester_id: row.requester_id.into(),
            organization_id: row.organization_id.map(Into::into),
            status: row.status.parse()?,
            priority: row.priority,
            scheduled_start: row.scheduled_start,
            started_at: row.started_at,
            completed_at: row.completed_at,
            output_location_id: row.output_location_id.into(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `craft_ingredients` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CraftIngredientRow {
    /// Ingredient row UUID.
    pub id: Uuid,
    /// Owning craft.
    pub craft_id: Uuid,
    /// Ingredient item.
    pub item_id: Uuid,
    /// Quantity required.
    pub required_quantity: Decimal,
    /// Primary source location.
    pub source_location_id: Option<Uuid>,
    /// Primary source type as text.
    pub source_type: Option<String>,
    /// Fulfillment status as text.
    pub status: String,
    /// Whether the ingredient may be skipped.
    pub optional: bool,
    /// Quantity without a source.
    pub shortfall: Decimal,
}

/// A row from the `craft_ingredient_allocations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AllocationRow {
    /// Owning ingredient row.
    pub ingredient_id: Uuid,
    /// Source type as text.
    pub source_type: String,
    /// Stock or source location.
    pub location_id: Option<Uuid>,
    /// Resource source, for non-stock allocations.
    pub resource_source_id: Option<Uuid>,
    /// Quantity drawn.
    pub quantity: Decimal,
}

impl TryFrom<AllocationRow> for Allocation {
    type Error = DbError;

    fn try_from(row: AllocationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            source_type: row.source_type.parse()?,
            location_id: row.location_id.map(Into::into),
            resource_source_id: row.resource_source_id.map(Into::into),
            quantity: row.quantity,
        })
    }
}

impl CraftIngredientRow {
    /// Attach this ingredient's allocations (already in position order).
    pub fn into_ingredient(self, allocations: Vec<Allocation>) -> Result<CraftIngredient, DbError> {
        Ok(CraftIngredient {
            id: self.id.into(),
            craft_id: self.craft_id.into(),
            item_id: self.item_id.into(),
            required_quantity: self.required_quantity,
            source_location_id: self.source_location_id.map(Into::into),
            source_type: self.source_type.map(|s| s.parse()).transpose()?,
            status: self.status.parse()?,
            optional: self.optional,
            shortfall: self.shortfall,
            allocations,
        })
    }
}

/// A row from the `stock_movements` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MovementRow {
    /// Movement UUID.
    pub id: Uuid,
    /// Kind as text.
    pub kind: String,
    /// Item moved.
    pub item_id: Uuid,
    /// Location affected.
    pub location_id: Uuid,
    /// Amount (signed for adjustments).
    pub quantity: Decimal,
    /// Craft that caused it.
    pub craft_id: Option<Uuid>,
    /// Reason code.
    pub reason: String,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = DbError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            kind: row.kind.parse()?,
            item_id: row.item_id.into(),
            location_id: row.location_id.into(),
            quantity: row.quantity,
            craft_id: row.craft_id.map(Into::into),
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

/// Decode a batch of rows, failing on the first bad one.
pub fn decode_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, DbError>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}
