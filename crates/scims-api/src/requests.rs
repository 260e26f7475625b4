//! Request bodies and query strings.
//!
//! Field-level checks run through [`validator`]; cross-entity rules
//! (unknown items, cycles, visibility) are left to the store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use scims_core::{NewCraft, StockAdjustment};
use scims_types::{
    Blueprint, BlueprintId, BlueprintIngredient, ItemId, ItemRarity, LocationId, LocationType,
    OrganizationId, OwnerType, ResourceSource, ResourceSourceId, ResourceSourceType, UserId,
    Visibility,
};

fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_positive"))
    }
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("must_not_be_negative"))
    }
}

fn non_zero(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_zero() {
        Err(ValidationError::new("must_not_be_zero"))
    } else {
        Ok(())
    }
}

fn unit_interval(value: &Decimal) -> Result<(), ValidationError> {
    if (Decimal::ZERO..=Decimal::ONE).contains(value) {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_between_0_and_1"))
    }
}

fn default_reliability() -> Decimal {
    Decimal::new(5, 1)
}

const fn default_multiplier() -> u32 {
    1
}

/// `POST /api/items`.
#[derive(Debug, Deserialize, Validate)]
pub struct ItemRequest {
    /// Edit this item instead of creating a new one. Refused once stock,
    /// history or a blueprint references it.
    pub id: Option<ItemId>,
    /// Display name.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Category.
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    /// Optional subcategory.
    #[validate(length(max = 100))]
    pub subcategory: Option<String>,
    /// Rarity tier.
    pub rarity: ItemRarity,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ItemRequest {
    /// Build the item to store.
    pub fn into_item(self, now: DateTime<Utc>) -> scims_types::Item {
        scims_types::Item {
            id: self.id.unwrap_or_default(),
            name: self.name,
            category: self.category,
            subcategory: self.subcategory,
            rarity: self.rarity,
            attributes: self.attributes,
            created_at: now,
        }
    }
}

/// `POST /api/locations`.
#[derive(Debug, Deserialize, Validate)]
pub struct LocationRequest {
    /// Replace this location instead of creating a new one.
    pub id: Option<LocationId>,
    /// Display name.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Kind of place.
    pub location_type: LocationType,
    /// Who owns it.
    pub owner_type: OwnerType,
    /// Owning user or organization.
    pub owner_id: Option<Uuid>,
    /// Containing location.
    pub parent_location_id: Option<LocationId>,
    /// Shared world counterpart.
    pub canonical_location_id: Option<LocationId>,
    /// Draw priority (higher first).
    #[serde(default)]
    pub priority: i32,
}

impl LocationRequest {
    /// Build the location to store.
    pub fn into_location(self, now: DateTime<Utc>) -> scims_types::Location {
        scims_types::Location {
            id: self.id.unwrap_or_default(),
            name: self.name,
            location_type: self.location_type,
            owner_type: self.owner_type,
            owner_id: self.owner_id,
            parent_location_id: self.parent_location_id,
            canonical_location_id: self.canonical_location_id,
            priority: self.priority,
            created_at: now,
        }
    }
}

/// `POST /api/stock/adjust`.
#[derive(Debug, Deserialize, Validate)]
pub struct AdjustStockRequest {
    /// Item adjusted.
    pub item_id: ItemId,
    /// Location adjusted.
    pub location_id: LocationId,
    /// Signed change to the on-hand quantity.
    #[validate(custom(function = "non_zero"))]
    pub delta: Decimal,
    /// Reason recorded in the journal.
    #[validate(length(min = 1, max = 200))]
    pub reason: String,
}

impl From<AdjustStockRequest> for StockAdjustment {
    fn from(req: AdjustStockRequest) -> Self {
        Self {
            item_id: req.item_id,
            location_id: req.location_id,
            delta: req.delta,
            reason: req.reason,
        }
    }
}

/// One ingredient of a [`BlueprintRequest`].
#[derive(Debug, Deserialize, Validate)]
pub struct IngredientRequest {
    /// Ingredient item.
    pub item_id: ItemId,
    /// Quantity per craft.
    #[validate(custom(function = "positive"))]
    pub quantity: Decimal,
    /// Whether the craft may proceed without it.
    #[serde(default)]
    pub optional: bool,
}

/// `POST /api/blueprints`. The requester becomes the owner.
#[derive(Debug, Deserialize, Validate)]
pub struct BlueprintRequest {
    /// Rename or change the visibility of this blueprint. Only its owner
    /// may, and the output, time and ingredients must match.
    pub id: Option<BlueprintId>,
    /// Display name.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Item produced.
    pub output_item_id: ItemId,
    /// Amount produced per craft.
    #[validate(custom(function = "positive"))]
    pub output_quantity: Decimal,
    /// Minutes per craft.
    pub crafting_time_minutes: u32,
    /// Ingredient list, in draw order.
    #[validate(nested)]
    pub ingredients: Vec<IngredientRequest>,
    /// Who may use it.
    pub visibility: Visibility,
}

impl BlueprintRequest {
    /// Build the blueprint to store, owned by `owner`.
    pub fn into_blueprint(self, owner: UserId, now: DateTime<Utc>) -> Blueprint {
        Blueprint {
            id: self.id.unwrap_or_default(),
            name: self.name,
            output_item_id: self.output_item_id,
            output_quantity: self.output_quantity,
            crafting_time_minutes: self.crafting_time_minutes,
            ingredients: self
                .ingredients
                .into_iter()
                .map(|i| BlueprintIngredient {
                    item_id: i.item_id,
                    quantity: i.quantity,
                    optional: i.optional,
                })
                .collect(),
            visibility: self.visibility,
            owner_id: Some(owner),
            usage_count: 0,
            created_at: now,
        }
    }
}

/// `POST /api/resource-sources`.
#[derive(Debug, Deserialize, Validate)]
pub struct ResourceSourceRequest {
    /// Replace this source instead of creating a new one.
    pub id: Option<ResourceSourceId>,
    /// Item offered.
    pub item_id: ItemId,
    /// Kind of source.
    pub source_type: ResourceSourceType,
    /// Where it is.
    pub location_id: Option<LocationId>,
    /// Who provides it.
    pub provider_id: Option<UserId>,
    /// Quantity on offer.
    #[validate(custom(function = "non_negative"))]
    pub available_quantity: Decimal,
    /// Price per unit.
    pub cost_per_unit: Option<Decimal>,
    /// Starting reliability in `[0, 1]`.
    #[serde(default = "default_reliability")]
    #[validate(custom(function = "unit_interval"))]
    pub reliability_score: Decimal,
}

impl ResourceSourceRequest {
    /// Build the source to store.
    pub fn into_source(self) -> ResourceSource {
        ResourceSource {
            id: self.id.unwrap_or_default(),
            item_id: self.item_id,
            source_type: self.source_type,
            location_id: self.location_id,
            provider_id: self.provider_id,
            available_quantity: self.available_quantity,
            cost_per_unit: self.cost_per_unit,
            reliability_score: self.reliability_score,
            last_verified: None,
        }
    }
}

/// `POST /api/resource-sources/{id}/verify`.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Whether the source still delivered.
    pub confirmed: bool,
}

/// `POST /api/crafts`. The requester comes from the header.
#[derive(Debug, Deserialize, Validate)]
pub struct CraftRequest {
    /// Blueprint to execute.
    pub blueprint_id: BlueprintId,
    /// Organization the craft is for.
    pub organization_id: Option<OrganizationId>,
    /// Scheduling priority.
    #[serde(default)]
    #[validate(range(min = -1000, max = 1000))]
    pub priority: i32,
    /// Earliest start.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Where the output is credited.
    pub output_location_id: LocationId,
}

impl CraftRequest {
    /// Build the engine request for `requester`.
    pub const fn into_new_craft(self, requester: UserId) -> NewCraft {
        NewCraft {
            blueprint_id: self.blueprint_id,
            requester_id: requester,
            organization_id: self.organization_id,
            priority: self.priority,
            scheduled_start: self.scheduled_start,
            output_location_id: self.output_location_id,
        }
    }
}

/// `GET /api/blueprints/{id}/resolve?multiplier=`.
#[derive(Debug, Deserialize, Validate)]
pub struct ResolveQuery {
    /// Number of crafts to plan for.
    #[serde(default = "default_multiplier")]
    #[validate(range(min = 1, max = 10_000))]
    pub multiplier: u32,
}

/// `GET /api/suggestions?item_id=&quantity=`.
#[derive(Debug, Deserialize, Validate)]
pub struct SuggestQuery {
    /// Item wanted.
    pub item_id: ItemId,
    /// Amount wanted.
    #[validate(custom(function = "positive"))]
    pub quantity: Decimal,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_adjustment_is_rejected() {
        let req = AdjustStockRequest {
            item_id: ItemId::new(),
            location_id: LocationId::new(),
            delta: Decimal::ZERO,
            reason: String::from("count"),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn nested_ingredient_quantity_is_checked() {
        let req: BlueprintRequest = serde_json::from_value(serde_json::json!({
            "name": "Widget",
            "output_item_id": ItemId::new(),
            "output_quantity": "1",
            "crafting_time_minutes": 5,
            "ingredients": [{ "item_id": ItemId::new(), "quantity": "-2" }],
            "visibility": "public",
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn reliability_defaults_to_half() {
        let req: ResourceSourceRequest = serde_json::from_value(serde_json::json!({
            "item_id": ItemId::new(),
            "source_type": "trading_post",
            "available_quantity": "40",
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.reliability_score, Decimal::new(5, 1));
    }

    #[test]
    fn blueprint_request_sets_owner() {
        let owner = UserId::new();
        let req: BlueprintRequest = serde_json::from_value(serde_json::json!({
            "name": "Widget",
            "output_item_id": ItemId::new(),
            "output_quantity": "2",
            "crafting_time_minutes": 5,
            "ingredients": [],
            "visibility": "private",
        }))
        .unwrap();
        let blueprint = req.into_blueprint(owner, Utc::now());
        assert_eq!(blueprint.owner_id, Some(owner));
        assert_eq!(blueprint.usage_count, 0);
    }
}
