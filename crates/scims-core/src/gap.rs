//! Resource gap analysis for a planned or running craft.

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use scims_ledger::StockLedger;
use scims_types::{CraftIngredient, FulfillmentStatus, IngredientGap, LocationId, ResourceSource};

use crate::craft::CraftRecord;
use crate::resolver::rank_sources;

/// Compute the gap for every ingredient of `record`, largest gap first.
///
/// Reserved and fulfilled ingredients have a gap of zero. For pending ones
/// the available quantity is summed over the stock locations the plan drew
/// on (or the primary source location when there are none). Ties keep
/// blueprint order.
///
/// Gaps measure ledger stock only. A slice the plan assigned to an external
/// resource source still counts as missing, since nothing has been
/// delivered yet; that source shows up among the candidates instead.
pub fn analyze(
    record: &CraftRecord,
    ledger: &StockLedger,
    sources: &[ResourceSource],
) -> Vec<IngredientGap> {
    let mut gaps: Vec<IngredientGap> = record
        .ingredients
        .iter()
        .map(|ingredient| ingredient_gap(ingredient, ledger, sources))
        .collect();
    gaps.sort_by(|a, b| b.gap.cmp(&a.gap));
    gaps
}

fn ingredient_gap(
    ingredient: &CraftIngredient,
    ledger: &StockLedger,
    sources: &[ResourceSource],
) -> IngredientGap {
    let settled = matches!(
        ingredient.status,
        FulfillmentStatus::Reserved | FulfillmentStatus::Fulfilled
    );

    let available = if settled {
        ingredient.required_quantity
    } else {
        watched_locations(ingredient)
            .into_iter()
            .map(|loc| ledger.available(ingredient.item_id, loc))
            .fold(Decimal::ZERO, |acc, q| acc.checked_add(q).unwrap_or(Decimal::MAX))
    };

    let gap = if settled {
        Decimal::ZERO
    } else {
        ingredient
            .required_quantity
            .checked_sub(available)
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO)
    };

    let candidates = if gap > Decimal::ZERO {
        rank_sources(sources, ingredient.item_id)
            .into_iter()
            .filter(|s| s.available_quantity >= gap)
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    IngredientGap {
        ingredient_id: ingredient.id,
        item_id: ingredient.item_id,
        required_quantity: ingredient.required_quantity,
        available_quantity: available,
        gap,
        candidates,
    }
}

fn watched_locations(ingredient: &CraftIngredient) -> BTreeSet<LocationId> {
    let from_allocations: BTreeSet<LocationId> =
        ingredient.stock_allocations().map(|(loc, _)| loc).collect();
    if from_allocations.is_empty() {
        ingredient.source_location_id.into_iter().collect()
    } else {
        from_allocations
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use scims_types::{
        Allocation, Craft, CraftId, CraftIngredientId, CraftStatus, ItemId, ResourceSourceId,
        ResourceSourceType, SourceType, UserId, BlueprintId,
    };

    use super::*;

    fn ingredient(
        craft_id: CraftId,
        item: ItemId,
        required: Decimal,
        location: LocationId,
        status: FulfillmentStatus,
    ) -> CraftIngredient {
        CraftIngredient {
            id: CraftIngredientId::new(),
            craft_id,
            item_id: item,
            required_quantity: required,
            source_location_id: Some(location),
            source_type: Some(SourceType::Stock),
            status,
            optional: false,
            shortfall: Decimal::ZERO,
            allocations: vec![Allocation::stock(location, required)],
        }
    }

    fn record(ingredients: Vec<CraftIngredient>, craft_id: CraftId) -> CraftRecord {
        let now = Utc::now();
        CraftRecord {
            craft: Craft {
                id: craft_id,
                blueprint_id: BlueprintId::new(),
                requester_id: UserId::new(),
                organization_id: None,
                status: CraftStatus::Planned,
                priority: 0,
                scheduled_start: None,
                started_at: None,
                completed_at: None,
                output_location_id: LocationId::new(),
                created_at: now,
                updated_at: now,
            },
            ingredients,
        }
    }

    #[test]
    fn gaps_sorted_descending_with_candidates() {
        let craft_id = CraftId::new();
        let loc = LocationId::new();
        let metal = ItemId::new();
        let crystal = ItemId::new();
        let mut ledger = StockLedger::new();
        ledger.credit(metal, loc, dec!(8), None).unwrap();
        ledger.credit(crystal, loc, dec!(1), None).unwrap();

        let rec = record(
            vec![
                ingredient(craft_id, metal, dec!(10), loc, FulfillmentStatus::Pending),
                ingredient(craft_id, crystal, dec!(6), loc, FulfillmentStatus::Pending),
            ],
            craft_id,
        );
        let small = ResourceSource {
            id: ResourceSourceId::new(),
            item_id: crystal,
            source_type: ResourceSourceType::PlayerStock,
            location_id: None,
            provider_id: Some(UserId::new()),
            available_quantity: dec!(2),
            cost_per_unit: None,
            reliability_score: dec!(0.9),
            last_verified: None,
        };
        let big = ResourceSource {
            id: ResourceSourceId::new(),
            available_quantity: dec!(50),
            reliability_score: dec!(0.4),
            ..small.clone()
        };

        let gaps = analyze(&rec, &ledger, &[small, big.clone()]);
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].item_id, crystal);
        assert_eq!(gaps[0].gap, dec!(5));
        assert_eq!(gaps[0].available_quantity, dec!(1));
        assert_eq!(gaps[0].candidates, vec![big]);
        assert_eq!(gaps[1].item_id, metal);
        assert_eq!(gaps[1].gap, dec!(2));
    }

    #[test]
    fn reserved_ingredients_have_no_gap() {
        let craft_id = CraftId::new();
        let loc = LocationId::new();
        let item = ItemId::new();
        let ledger = StockLedger::new();
        let rec = record(
            vec![ingredient(craft_id, item, dec!(10), loc, FulfillmentStatus::Reserved)],
            craft_id,
        );
        let gaps = analyze(&rec, &ledger, &[]);
        assert_eq!(gaps[0].gap, Decimal::ZERO);
        assert!(gaps[0].candidates.is_empty());
    }

    #[test]
    fn external_slice_still_counts_as_gap() {
        let craft_id = CraftId::new();
        let loc = LocationId::new();
        let item = ItemId::new();
        let mut ledger = StockLedger::new();
        ledger.credit(item, loc, dec!(30), None).unwrap();

        let trader = ResourceSource {
            id: ResourceSourceId::new(),
            item_id: item,
            source_type: ResourceSourceType::PlayerStock,
            location_id: None,
            provider_id: Some(UserId::new()),
            available_quantity: dec!(20),
            cost_per_unit: None,
            reliability_score: dec!(0.7),
            last_verified: None,
        };
        let mut mixed = ingredient(craft_id, item, dec!(50), loc, FulfillmentStatus::Pending);
        mixed.allocations = vec![
            Allocation::stock(loc, dec!(30)),
            Allocation {
                source_type: SourceType::Player,
                location_id: None,
                resource_source_id: Some(trader.id),
                quantity: dec!(20),
            },
        ];
        let rec = record(vec![mixed], craft_id);

        let gaps = analyze(&rec, &ledger, std::slice::from_ref(&trader));
        assert_eq!(gaps[0].available_quantity, dec!(30));
        assert_eq!(gaps[0].gap, dec!(20));
        assert_eq!(gaps[0].candidates, vec![trader]);
    }

    #[test]
    fn surplus_stock_yields_zero_gap() {
        let craft_id = CraftId::new();
        let loc = LocationId::new();
        let item = ItemId::new();
        let mut ledger = StockLedger::new();
        ledger.credit(item, loc, dec!(40), None).unwrap();
        let rec = record(
            vec![ingredient(craft_id, item, dec!(10), loc, FulfillmentStatus::Pending)],
            craft_id,
        );
        let gaps = analyze(&rec, &ledger, &[]);
        assert_eq!(gaps[0].gap, Decimal::ZERO);
        assert_eq!(gaps[0].available_quantity, dec!(40));
    }
}
