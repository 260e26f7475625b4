//! Planning and reporting payloads produced by the crafting engine.
//!
//! These are values, not errors: an unresolved ingredient is a valid
//! planning outcome that the API returns to the caller as-is.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::SourceType;
use crate::ids::{BlueprintId, CraftIngredientId, ItemId};
use crate::structs::{Allocation, ResourceSource};

/// Outcome of resolving one ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum PlanStatus {
    /// Fully covered; stock slices are reservation candidates.
    Resolved,
    /// Part of the requirement has no source (status stays pending).
    Unresolved,
}

/// Resolver output for one blueprint ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IngredientPlan {
    /// Required item.
    pub item_id: ItemId,
    /// Required quantity (already scaled by the craft count).
    #[ts(as = "String")]
    pub required_quantity: Decimal,
    /// Copied from the blueprint ingredient.
    pub optional: bool,
    /// Chosen sources, stock first, in draw order.
    pub allocations: Vec<Allocation>,
    /// Quantity left uncovered.
    #[ts(as = "String")]
    pub shortfall: Decimal,
    /// Whether the plan is complete.
    pub status: PlanStatus,
}

impl IngredientPlan {
    /// Source type of the first allocation, if any.
    pub fn primary_source(&self) -> Option<SourceType> {
        self.allocations.first().map(|a| a.source_type)
    }

    /// Whether the plan covers the full requirement.
    pub fn is_resolved(&self) -> bool {
        self.status == PlanStatus::Resolved
    }
}

/// Gap analysis row for one craft ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct IngredientGap {
    /// Craft ingredient row.
    pub ingredient_id: CraftIngredientId,
    /// Required item.
    pub item_id: ItemId,
    /// Total required.
    #[ts(as = "String")]
    pub required_quantity: Decimal,
    /// Currently available at the ingredient's planned stock locations.
    #[ts(as = "String")]
    pub available_quantity: Decimal,
    /// `required - available`, floored at zero.
    #[ts(as = "String")]
    pub gap: Decimal,
    /// External sources able to cover the whole gap, best first.
    pub candidates: Vec<ResourceSource>,
}

/// One ranked blueprint in a craft suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Suggestion {
    /// Suggested blueprint.
    pub blueprint_id: BlueprintId,
    /// Blueprint display name.
    pub blueprint_name: String,
    /// Crafts needed to reach the target quantity.
    pub craft_count: u32,
    /// Whether every required ingredient resolves with zero shortfall.
    pub feasible: bool,
    /// `craft_count * crafting_time_minutes`.
    pub total_crafting_minutes: u64,
    /// Blueprint popularity, used as the final tie-break.
    pub usage_count: u64,
    /// Sum of shortfalls over required ingredients.
    #[ts(as = "String")]
    pub total_shortfall: Decimal,
    /// Per-ingredient plans for the scaled requirement.
    pub plans: Vec<IngredientPlan>,
}

/// Usage count of one blueprint in the stats snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BlueprintUsage {
    /// Blueprint identifier.
    pub blueprint_id: BlueprintId,
    /// Blueprint display name.
    pub name: String,
    /// Completed crafts.
    pub usage_count: u64,
}

/// Aggregated usage statistics produced by the periodic aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UsageStats {
    /// When the snapshot was computed.
    pub generated_at: DateTime<Utc>,
    /// Crafts in `planned`.
    pub planned: u64,
    /// Crafts in `in_progress`.
    pub in_progress: u64,
    /// Crafts in `completed`.
    pub completed: u64,
    /// Crafts in `cancelled`.
    pub cancelled: u64,
    /// Crafts completed in the 24 hours before `generated_at`.
    pub completed_last_24h: u64,
    /// Most used blueprints, highest first.
    pub top_blueprints: Vec<BlueprintUsage>,
    /// Total reserved quantity across all stock rows.
    #[ts(as = "String")]
    pub outstanding_reserved: Decimal,
}
