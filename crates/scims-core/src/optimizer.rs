//! Craft suggestions: which visible blueprint best produces a target item.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use scims_types::{Blueprint, ItemId, Suggestion, UserId};

use crate::resolver::{Resolver, is_feasible, required_shortfall};

/// Rank every blueprint visible to `requester` that outputs `target_item`.
///
/// Each candidate is resolved at `ceil(target_quantity / output_quantity)`
/// crafts. Ordering: feasible first, then shortest total crafting time,
/// then most used, then blueprint ID. Blueprints whose craft count does
/// not fit a `u32` are skipped.
pub fn suggest(
    target_item: ItemId,
    target_quantity: Decimal,
    requester: UserId,
    blueprints: &[Blueprint],
    resolver: &Resolver<'_>,
) -> Vec<Suggestion> {
    if target_quantity <= Decimal::ZERO {
        return Vec::new();
    }

    let mut suggestions: Vec<Suggestion> = blueprints
        .iter()
        .filter(|bp| bp.output_item_id == target_item && bp.is_visible_to(requester))
        .filter_map(|bp| {
            let craft_count = craft_count(target_quantity, bp.output_quantity)?;
            let plans = resolver.resolve(bp, craft_count);
            Some(Suggestion {
                blueprint_id: bp.id,
                blueprint_name: bp.name.clone(),
                craft_count,
                feasible: is_feasible(&plans),
                total_crafting_minutes: u64::from(craft_count)
                    .saturating_mul(u64::from(bp.crafting_time_minutes)),
                usage_count: bp.usage_count,
                total_shortfall: required_shortfall(&plans),
                plans,
            })
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.feasible
            .cmp(&a.feasible)
            .then_with(|| a.total_crafting_minutes.cmp(&b.total_crafting_minutes))
            .then_with(|| b.usage_count.cmp(&a.usage_count))
            .then_with(|| a.blueprint_id.cmp(&b.blueprint_id))
    });

    tracing::debug!(
        %target_item,
        %target_quantity,
        candidates = suggestions.len(),
        "craft suggestions ranked"
    );
    suggestions
}

/// Crafts needed to reach `target`: `ceil(target / output)`.
pub fn craft_count(target: Decimal, output: Decimal) -> Option<u32> {
    if output <= Decimal::ZERO {
        return None;
    }
    target.checked_div(output)?.ceil().to_u32()
}
