//! Core entity structs: catalog, ledger rows, blueprints, crafts and
//! resource sources.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::enums::{
    CraftStatus, FulfillmentStatus, ItemRarity, LocationType, MovementKind, OwnerType,
    ResourceSourceType, SourceType, Visibility,
};
use crate::ids::{
    BlueprintId, CraftId, CraftIngredientId, ItemId, LocationId, OrganizationId,
    ResourceSourceId, StockMovementId, UserId,
};

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A catalog entry. Immutable once referenced by stock or history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Item {
    /// Unique item identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Top-level category (e.g. `"ore"`, `"component"`).
    pub category: String,
    /// Optional finer classification.
    pub subcategory: Option<String>,
    /// Rarity tier.
    pub rarity: ItemRarity,
    /// Free-form string attributes.
    pub attributes: BTreeMap<String, String>,
    /// When the item was first catalogued.
    pub created_at: DateTime<Utc>,
}

/// A named storage container.
///
/// Locations form a graph through two optional edges: `parent_location_id`
/// (physical nesting) and `canonical_location_id` (the world-shared public
/// counterpart). Neither edge set may contain a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Location {
    /// Unique location identifier.
    pub id: LocationId,
    /// Display name.
    pub name: String,
    /// Container kind.
    pub location_type: LocationType,
    /// Owner category.
    pub owner_type: OwnerType,
    /// Owning user or organization; `None` for world locations.
    pub owner_id: Option<Uuid>,
    /// Enclosing location, if nested.
    pub parent_location_id: Option<LocationId>,
    /// Canonical public counterpart, if any.
    pub canonical_location_id: Option<LocationId>,
    /// Resolver preference; higher is drawn from first on ties.
    pub priority: i32,
    /// When the location was registered.
    pub created_at: DateTime<Utc>,
}

impl Location {
    /// Whether `user` owns this location directly.
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner_type == OwnerType::User && self.owner_id == Some(user.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Stock ledger rows
// ---------------------------------------------------------------------------

/// Stock on hand for one (item, location) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ItemStock {
    /// The stocked item.
    pub item_id: ItemId,
    /// Where the stock is held.
    pub location_id: LocationId,
    /// Total on hand.
    #[ts(as = "String")]
    pub quantity: Decimal,
    /// Portion earmarked for in-progress crafts.
    #[ts(as = "String")]
    pub reserved_quantity: Decimal,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl ItemStock {
    /// An empty row for `(item_id, location_id)`.
    pub fn empty(item_id: ItemId, location_id: LocationId) -> Self {
        Self {
            item_id,
            location_id,
            quantity: Decimal::ZERO,
            reserved_quantity: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    /// `quantity - reserved_quantity`, floored at zero.
    pub fn available_quantity(&self) -> Decimal {
        self.quantity
            .checked_sub(self.reserved_quantity)
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO)
    }

    /// Whether `0 <= reserved_quantity <= quantity` holds.
    pub fn is_consistent(&self) -> bool {
        self.reserved_quantity >= Decimal::ZERO
            && self.quantity >= Decimal::ZERO
            && self.reserved_quantity <= self.quantity
    }
}

/// Journal record of one stock ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StockMovement {
    /// Unique movement identifier.
    pub id: StockMovementId,
    /// What happened.
    pub kind: MovementKind,
    /// Affected item.
    pub item_id: ItemId,
    /// Affected location.
    pub location_id: LocationId,
    /// Amount moved (signed only for [`MovementKind::Adjust`]).
    #[ts(as = "String")]
    pub quantity: Decimal,
    /// Craft that caused the movement, if any.
    pub craft_id: Option<CraftId>,
    /// Human-readable reason (e.g. `"CRAFT_START"`).
    pub reason: String,
    /// When the movement was recorded.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Blueprints
// ---------------------------------------------------------------------------

/// One required input of a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BlueprintIngredient {
    /// Required item.
    pub item_id: ItemId,
    /// Quantity required per craft.
    #[ts(as = "String")]
    pub quantity: Decimal,
    /// Optional ingredients never block feasibility or craft start.
    pub optional: bool,
}

/// A recipe producing `output_quantity` of `output_item_id` per craft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Blueprint {
    /// Unique blueprint identifier.
    pub id: BlueprintId,
    /// Display name.
    pub name: String,
    /// Produced item.
    pub output_item_id: ItemId,
    /// Units produced per craft.
    #[ts(as = "String")]
    pub output_quantity: Decimal,
    /// Minutes a craft takes once started.
    pub crafting_time_minutes: u32,
    /// Inputs, in recipe order.
    pub ingredients: Vec<BlueprintIngredient>,
    /// Who may see and use the blueprint.
    pub visibility: Visibility,
    /// Creator; private blueprints are visible to this user only.
    pub owner_id: Option<UserId>,
    /// Number of completed crafts using this blueprint.
    pub usage_count: u64,
    /// When the blueprint was created.
    pub created_at: DateTime<Utc>,
}

impl Blueprint {
    /// Whether `user` may see and craft this blueprint.
    pub fn is_visible_to(&self, user: UserId) -> bool {
        self.visibility == Visibility::Public || self.owner_id == Some(user)
    }
}

// ---------------------------------------------------------------------------
// Crafts
// ---------------------------------------------------------------------------

/// One execution instance of a blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Craft {
    /// Unique craft identifier.
    pub id: CraftId,
    /// Blueprint being executed.
    pub blueprint_id: BlueprintId,
    /// User who requested the craft.
    pub requester_id: UserId,
    /// Organization the craft is run for, if any.
    pub organization_id: Option<OrganizationId>,
    /// Lifecycle status.
    pub status: CraftStatus,
    /// Higher is more urgent.
    pub priority: i32,
    /// Requested start time; the ready time is measured from here when set.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// When stock was reserved.
    pub started_at: Option<DateTime<Utc>>,
    /// When output was credited.
    pub completed_at: Option<DateTime<Utc>>,
    /// Where the output is credited.
    pub output_location_id: LocationId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

/// One slice of an ingredient requirement drawn from a single source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Allocation {
    /// Where this slice comes from.
    pub source_type: SourceType,
    /// Stock location (stock slices) or source location (external slices).
    pub location_id: Option<LocationId>,
    /// External resource source, for player/universe slices.
    pub resource_source_id: Option<ResourceSourceId>,
    /// Quantity drawn from this source.
    #[ts(as = "String")]
    pub quantity: Decimal,
}

impl Allocation {
    /// A slice of ledger stock at `location_id`.
    pub const fn stock(location_id: LocationId, quantity: Decimal) -> Self {
        Self {
            source_type: SourceType::Stock,
            location_id: Some(location_id),
            resource_source_id: None,
            quantity,
        }
    }

    /// The ledger location of a stock slice; `None` for external slices.
    pub fn stock_location(&self) -> Option<LocationId> {
        if self.source_type == SourceType::Stock {
            self.location_id
        } else {
            None
        }
    }
}

/// Per-craft, per-item requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CraftIngredient {
    /// Unique ingredient row identifier.
    pub id: CraftIngredientId,
    /// Owning craft.
    pub craft_id: CraftId,
    /// Required item (unique within the craft).
    pub item_id: ItemId,
    /// Total quantity required.
    #[ts(as = "String")]
    pub required_quantity: Decimal,
    /// Location of the primary allocation, if any.
    pub source_location_id: Option<LocationId>,
    /// Source type of the primary allocation; `None` when unresolved.
    pub source_type: Option<SourceType>,
    /// Fulfillment status.
    pub status: FulfillmentStatus,
    /// Copied from the blueprint ingredient.
    pub optional: bool,
    /// Quantity no source could cover at planning time.
    #[ts(as = "String")]
    pub shortfall: Decimal,
    /// Planned sources, in resolver order.
    pub allocations: Vec<Allocation>,
}

impl CraftIngredient {
    /// Allocations drawn from ledger stock, with their location.
    pub fn stock_allocations(&self) -> impl Iterator<Item = (LocationId, Decimal)> + '_ {
        self.allocations
            .iter()
            .filter_map(|a| a.stock_location().map(|loc| (loc, a.quantity)))
    }

    /// Whether any allocation draws on ledger stock.
    pub fn uses_stock(&self) -> bool {
        self.stock_allocations().next().is_some()
    }

    /// Whether planning left part of the requirement uncovered.
    pub fn is_unresolved(&self) -> bool {
        self.shortfall > Decimal::ZERO
    }
}

// ---------------------------------------------------------------------------
// Resource sources
// ---------------------------------------------------------------------------

/// Where an item can be obtained outside the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ResourceSource {
    /// Unique source identifier.
    pub id: ResourceSourceId,
    /// Item offered.
    pub item_id: ItemId,
    /// Kind of source.
    pub source_type: ResourceSourceType,
    /// Where the source is, if known.
    pub location_id: Option<LocationId>,
    /// Player offering the stock, for player sources.
    pub provider_id: Option<UserId>,
    /// Quantity the source can supply.
    #[ts(as = "String")]
    pub available_quantity: Decimal,
    /// Price per unit, if known.
    #[ts(as = "Option<String>")]
    pub cost_per_unit: Option<Decimal>,
    /// Trustworthiness in `[0, 1]`, moved by verification events.
    #[ts(as = "String")]
    pub reliability_score: Decimal,
    /// Last verification time.
    pub last_verified: Option<DateTime<Utc>>,
}
