//! Shared type definitions for SCIMS.
//!
//! This crate is the single source of truth for the entity types used across
//! the workspace. Types flow to `TypeScript` via `ts-rs` for API clients.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Enumerations (craft status, source types, movement kinds)
//! - [`structs`] -- Entities (items, locations, stock rows, blueprints, crafts)
//! - [`plans`] -- Resolver, gap analysis, suggestion and stats payloads

pub mod enums;
pub mod ids;
pub mod plans;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    CraftStatus, FulfillmentStatus, ItemRarity, LocationType, MovementKind, OwnerType,
    ParseEnumError, ResourceSourceType, SourceType, Visibility,
};
pub use ids::{
    BlueprintId, CraftId, CraftIngredientId, ItemId, LocationId, OrganizationId,
    ResourceSourceId, StockMovementId, UserId,
};
pub use plans::{BlueprintUsage, IngredientGap, IngredientPlan, PlanStatus, Suggestion, UsageStats};
pub use structs::{
    Allocation, Blueprint, BlueprintIngredient, Craft, CraftIngredient, Item, ItemStock, Location,
    ResourceSource, StockMovement,
};

#[cfg(test)]
mod tests {
    //! Tests for type exports and `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes bindings into `bindings/` relative to the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::ItemId::export_all();
        let _ = crate::ids::LocationId::export_all();
        let _ = crate::ids::BlueprintId::export_all();
        let _ = crate::ids::CraftId::export_all();
        let _ = crate::ids::CraftIngredientId::export_all();
        let _ = crate::ids::ResourceSourceId::export_all();
        let _ = crate::ids::UserId::export_all();
        let _ = crate::ids::OrganizationId::export_all();
        let _ = crate::ids::StockMovementId::export_all();

        // Enums
        let _ = crate::enums::ItemRarity::export_all();
        let _ = crate::enums::LocationType::export_all();
        let _ = crate::enums::OwnerType::export_all();
        let _ = crate::enums::Visibility::export_all();
        let _ = crate::enums::CraftStatus::export_all();
        let _ = crate::enums::SourceType::export_all();
        let _ = crate::enums::FulfillmentStatus::export_all();
        let _ = crate::enums::ResourceSourceType::export_all();
        let _ = crate::enums::MovementKind::export_all();

        // Structs
        let _ = crate::structs::Item::export_all();
        let _ = crate::structs::Location::export_all();
        let _ = crate::structs::ItemStock::export_all();
        let _ = crate::structs::StockMovement::export_all();
        let _ = crate::structs::BlueprintIngredient::export_all();
        let _ = crate::structs::Blueprint::export_all();
        let _ = crate::structs::Craft::export_all();
        let _ = crate::structs::Allocation::export_all();
        let _ = crate::structs::CraftIngredient::export_all();
        let _ = crate::structs::ResourceSource::export_all();

        // Plans
        let _ = crate::plans::PlanStatus::export_all();
        let _ = crate::plans::IngredientPlan::export_all();
        let _ = crate::plans::IngredientGap::export_all();
        let _ = crate::plans::Suggestion::export_all();
        let _ = crate::plans::BlueprintUsage::export_all();
        let _ = crate::plans::UsageStats::export_all();
    }

    #[test]
    fn available_quantity_subtracts_reserved() {
        use rust_decimal::Decimal;

        let mut row = crate::ItemStock::empty(crate::ItemId::new(), crate::LocationId::new());
        row.quantity = Decimal::new(100, 0);
        row.reserved_quantity = Decimal::new(30, 0);
        assert_eq!(row.available_quantity(), Decimal::new(70, 0));
        assert!(row.is_consistent());

        row.reserved_quantity = Decimal::new(101, 0);
        assert!(!row.is_consistent());
        assert_eq!(row.available_quantity(), Decimal::ZERO);
    }
}
