//! Catalog write validation and resource source verification.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use scims_types::{Blueprint, Item, ResourceSource};

use crate::error::StoreError;

/// Weight of the previous score in the reliability moving average.
pub const RELIABILITY_DECAY: Decimal = dec!(0.8);

/// Weight of a confirmed verification in the reliability moving average.
pub const RELIABILITY_CONFIRM_WEIGHT: Decimal = dec!(0.2);

/// Reject items with a blank name or category.
pub fn validate_item(item: &Item) -> Result<(), StoreError> {
    if item.name.trim().is_empty() {
        return Err(StoreError::Validation(String::from("item name is empty")));
    }
    if item.category.trim().is_empty() {
        return Err(StoreError::Validation(format!(
            "item {} has an empty category",
            item.id
        )));
    }
    Ok(())
}

/// Check blueprint shape: positive output and ingredient quantities, no
/// ingredient listed twice, and no ingredient equal to the output.
pub fn validate_blueprint(blueprint: &Blueprint) -> Result<(), StoreError> {
    if blueprint.name.trim().is_empty() {
        return Err(StoreError::Validation(String::from(
            "blueprint name is empty",
        )));
    }
    if blueprint.output_quantity <= Decimal::ZERO {
        return Err(StoreError::Validation(format!(
            "blueprint {} output quantity must be positive, got {}",
            blueprint.id, blueprint.output_quantity
        )));
    }

    let mut seen = BTreeSet::new();
    for ingredient in &blueprint.ingredients {
        if ingredient.quantity <= Decimal::ZERO {
            return Err(StoreError::Validation(format!(
                "blueprint {} ingredient {} quantity must be positive, got {}",
                blueprint.id, ingredient.item_id, ingredient.quantity
            )));
        }
        if ingredient.item_id == blueprint.output_item_id {
            return Err(StoreError::Validation(format!(
                "blueprint {} consumes its own output {}",
                blueprint.id, ingredient.item_id
            )));
        }
        if !seen.insert(ingredient.item_id) {
            return Err(StoreError::Validation(format!(
                "blueprint {} lists ingredient {} twice",
                blueprint.id, ingredient.item_id
            )));
        }
    }
    Ok(())
}

/// Gate a write over an existing item.
///
/// `reference` names whatever still points at the item (stock, journal,
/// blueprint). A referenced item may be re-put unchanged but not edited.
/// The stored `created_at` is kept.
pub fn revise_item(
    existing: &Item,
    incoming: &mut Item,
    reference: Option<&str>,
) -> Result<(), StoreError> {
    incoming.created_at = existing.created_at;
    match reference {
        Some(reference) if existing != incoming => Err(StoreError::Conflict(format!(
            "item {} is referenced by a {reference} and cannot change",
            existing.id
        ))),
        _ => Ok(()),
    }
}

/// Gate a write over an existing blueprint.
///
/// Only the stored owner may write, and only `name` and `visibility` may
/// change. Output, crafting time and ingredients are fixed at creation.
/// The stored `usage_count` and `created_at` are kept.
pub fn revise_blueprint(existing: &Blueprint, incoming: &mut Blueprint) -> Result<(), StoreError> {
    if existing.owner_id != incoming.owner_id {
        return Err(StoreError::Forbidden(format!(
            "blueprint {} belongs to another user",
            existing.id
        )));
    }
    let structural = [
        ("output item", existing.output_item_id != incoming.output_item_id),
        (
            "output quantity",
            existing.output_quantity != incoming.output_quantity,
        ),
        (
            "crafting time",
            existing.crafting_time_minutes != incoming.crafting_time_minutes,
        ),
        ("ingredients", existing.ingredients != incoming.ingredients),
    ];
    if let Some((field, _)) = structural.iter().find(|(_, changed)| *changed) {
        return Err(StoreError::Conflict(format!(
            "blueprint {} {field} cannot change after creation",
            existing.id
        )));
    }
    incoming.usage_count = existing.usage_count;
    incoming.created_at = existing.created_at;
    Ok(())
}

/// Reject sources with negative stock, negative cost, or a reliability
/// score outside `[0, 1]`.
pub fn validate_resource_source(source: &ResourceSource) -> Result<(), StoreError> {
    if source.available_quantity < Decimal::ZERO {
        return Err(StoreError::Validation(format!(
            "resource source {} has negative available quantity",
            source.id
        )));
    }
    if source.cost_per_unit.is_some_and(|c| c < Decimal::ZERO) {
        return Err(StoreError::Validation(format!(
            "resource source {} has negative cost",
            source.id
        )));
    }
    if source.reliability_score < Decimal::ZERO || source.reliability_score > Decimal::ONE {
        return Err(StoreError::Validation(format!(
            "resource source {} reliability {} outside [0, 1]",
            source.id, source.reliability_score
        )));
    }
    Ok(())
}

/// Fold a verification outcome into the reliability score.
///
/// `score' = score * 0.8 + (confirmed ? 0.2 : 0)`, clamped to `[0, 1]`.
/// Stamps `last_verified` with `now`.
pub fn record_verification(source: &mut ResourceSource, confirmed: bool, now: DateTime<Utc>) {
    let observed = if confirmed {
        RELIABILITY_CONFIRM_WEIGHT
    } else {
        Decimal::ZERO
    };
    let next = source
        .reliability_score
        .checked_mul(RELIABILITY_DECAY)
        .and_then(|s| s.checked_add(observed))
        .unwrap_or(Decimal::ONE);
    source.reliability_score = next.clamp(Decimal::ZERO, Decimal::ONE);
    source.last_verified = Some(now);
    tracing::debug!(
        resource_source_id = %source.id,
        confirmed,
        reliability = %source.reliability_score,
        "resource source verified"
    );
}
