//! Ingredient resolution.
//!
//! For each blueprint ingredient the resolver first draws on ledger stock in
//! locations the requester can access, then covers whatever remains from a
//! single off-ledger [`ResourceSource`]. Resolution is read-only: it produces
//! [`IngredientPlan`]s and never touches the ledger.
//!
//! # Ordering
//!
//! - Stock rows: available quantity descending, location priority
//!   descending, location ID ascending.
//! - Resource sources: reliability descending, cost ascending (unknown cost
//!   last), most recently verified first (never verified last), ID
//!   ascending.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use rust_decimal::Decimal;

use scims_ledger::StockLedger;
use scims_types::{
    Allocation, Blueprint, BlueprintIngredient, IngredientPlan, ItemId, ItemStock, LocationId,
    PlanStatus, ResourceSource,
};

use crate::location::LocationGraph;

/// Read-only view of everything resolution needs.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    stock: &'a StockLedger,
    sources: &'a [ResourceSource],
    locations: &'a LocationGraph,
    accessible: &'a BTreeSet<LocationId>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over a stock snapshot, the known resource sources,
    /// the location graph and the requester's access scope.
    pub const fn new(
        stock: &'a StockLedger,
        sources: &'a [ResourceSource],
        locations: &'a LocationGraph,
        accessible: &'a BTreeSet<LocationId>,
    ) -> Self {
        Self {
            stock,
            sources,
            locations,
            accessible,
        }
    }

    /// Resolve every ingredient of `blueprint` scaled by `multiplier`.
    ///
    /// Plans come back in blueprint ingredient order.
    pub fn resolve(&self, blueprint: &Blueprint, multiplier: u32) -> Vec<IngredientPlan> {
        blueprint
            .ingredients
            .iter()
            .map(|ingredient| self.resolve_ingredient(ingredient, multiplier))
            .collect()
    }

    /// Resolve one ingredient.
    pub fn resolve_ingredient(
        &self,
        ingredient: &BlueprintIngredient,
        multiplier: u32,
    ) -> IngredientPlan {
        let required = ingredient
            .quantity
            .checked_mul(Decimal::from(multiplier))
            .unwrap_or(Decimal::MAX);

        let mut allocations = Vec::new();
        let mut remaining = required;

        for row in self.stock_candidates(ingredient.item_id) {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = row.available_quantity().min(remaining);
            allocations.push(Allocation::stock(row.location_id, take));
            remaining = remaining.checked_sub(take).unwrap_or(Decimal::ZERO);
        }

        if remaining > Decimal::ZERO {
            let covering = rank_sources(self.sources, ingredient.item_id)
                .into_iter()
                .find(|s| s.available_quantity >= remaining);
            if let Some(source) = covering {
                allocations.push(Allocation {
                    source_type: source.source_type.ingredient_source(),
                    location_id: source.location_id,
                    resource_source_id: Some(source.id),
                    quantity: remaining,
                });
                remaining = Decimal::ZERO;
            }
        }

        let status = if remaining > Decimal::ZERO {
            tracing::debug!(
                item_id = %ingredient.item_id,
                %required,
                shortfall = %remaining,
                "ingredient unresolved"
            );
            PlanStatus::Unresolved
        } else {
            PlanStatus::Resolved
        };

        IngredientPlan {
            item_id: ingredient.item_id,
            required_quantity: required,
            optional: ingredient.optional,
            allocations,
            shortfall: remaining.max(Decimal::ZERO),
            status,
        }
    }

    /// Accessible stock rows with something available, in draw order.
    fn stock_candidates(&self, item_id: ItemId) -> Vec<&'a ItemStock> {
        let mut rows: Vec<&ItemStock> = self
            .stock
            .rows_for_item(item_id)
            .filter(|row| self.accessible.contains(&row.location_id))
            .filter(|row| row.available_quantity() > Decimal::ZERO)
            .collect();
        rows.sort_by(|a, b| {
            b.available_quantity()
                .cmp(&a.available_quantity())
                .then_with(|| {
                    self.locations
                        .priority(b.location_id)
                        .cmp(&self.locations.priority(a.location_id))
                })
                .then_with(|| a.location_id.cmp(&b.location_id))
        });
        rows
    }
}

/// Resource sources for `item_id` with something available, best first.
pub fn rank_sources(sources: &[ResourceSource], item_id: ItemId) -> Vec<&ResourceSource> {
    let mut ranked: Vec<&ResourceSource> = sources
        .iter()
        .filter(|s| s.item_id == item_id && s.available_quantity > Decimal::ZERO)
        .collect();
    ranked.sort_by(|a, b| compare_sources(a, b));
    ranked
}

fn compare_sources(a: &ResourceSource, b: &ResourceSource) -> Ordering {
    b.reliability_score
        .cmp(&a.reliability_score)
        .then_with(|| match (a.cost_per_unit, b.cost_per_unit) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| match (a.last_verified, b.last_verified) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Whether every non-optional plan is resolved.
pub fn is_feasible(plans: &[IngredientPlan]) -> bool {
    plans.iter().all(|p| p.optional || p.is_resolved())
}

/// Sum of shortfalls over non-optional plans.
pub fn required_shortfall(plans: &[IngredientPlan]) -> Decimal {
    plans
        .iter()
        .filter(|p| !p.optional)
        .fold(Decimal::ZERO, |acc, p| {
            acc.checked_add(p.shortfall).unwrap_or(Decimal::MAX)
        })
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use scims_types::{
        BlueprintId, ResourceSourceId, ResourceSourceType, SourceType, UserId, Visibility,
    };

    use super::*;

    struct Fixture {
        ledger: StockLedger,
        sources: Vec<ResourceSource>,
        graph: LocationGraph,
        scope: BTreeSet<LocationId>,
        item: ItemId,
    }

    fn fixture() -> Fixture {
        Fixture {
            ledger: StockLedger::new(),
            sources: Vec::new(),
            graph: LocationGraph::new(),
            scope: BTreeSet::new(),
            item: ItemId::new(),
        }
    }

    fn stock_at(fx: &mut Fixture, quantity: Decimal) -> LocationId {
        let loc = LocationId::new();
        let _ = fx.ledger.credit(fx.item, loc, quantity, None);
        fx.scope.insert(loc);
        loc
    }

    fn source(item: ItemId, available: Decimal, reliability: Decimal) -> ResourceSource {
        ResourceSource {
            id: ResourceSourceId::new(),
            item_id: item,
            source_type: ResourceSourceType::TradingPost,
            location_id: None,
            provider_id: None,
            available_quantity: available,
            cost_per_unit: None,
            reliability_score: reliability,
            last_verified: None,
        }
    }

    fn blueprint(item: ItemId, quantity: Decimal) -> Blueprint {
        Blueprint {
            id: BlueprintId::new(),
            name: String::from("Widget"),
            output_item_id: ItemId::new(),
            output_quantity: dec!(1),
            crafting_time_minutes: 10,
            ingredients: vec![BlueprintIngredient {
                item_id: item,
                quantity,
                optional: false,
            }],
            visibility: Visibility::Public,
            owner_id: Some(UserId::new()),
            usage_count: 0,
            created_at: Utc::now(),
        }
    }

    fn resolve_one(fx: &Fixture, quantity: Decimal, multiplier: u32) -> IngredientPlan {
        let bp = blueprint(fx.item, quantity);
        let resolver = Resolver::new(&fx.ledger, &fx.sources, &fx.graph, &fx.scope);
        let mut plans = resolver.resolve(&bp, multiplier);
        assert_eq!(plans.len(), 1);
        plans.remove(0)
    }

    #[test]
    fn stock_covers_requirement() {
        let mut fx = fixture();
        let loc = stock_at(&mut fx, dec!(100));
        let plan = resolve_one(&fx, dec!(10), 1);
        assert!(plan.is_resolved());
        assert_eq!(plan.allocations, vec![Allocation::stock(loc, dec!(10))]);
        assert_eq!(plan.primary_source(), Some(SourceType::Stock));
    }

    #[test]
    fn stock_then_source_covers_remainder() {
        let mut fx = fixture();
        let loc = stock_at(&mut fx, dec!(30));
        let src = source(fx.item, dec!(100), dec!(0.9));
        let src_id = src.id;
        fx.sources.push(src);

        let plan = resolve_one(&fx, dec!(50), 1);
        assert!(plan.is_resolved());
        assert_eq!(plan.allocations.len(), 2);
        assert_eq!(plan.allocations[0], Allocation::stock(loc, dec!(30)));
        assert_eq!(plan.allocations[1].resource_source_id, Some(src_id));
        assert_eq!(plan.allocations[1].quantity, dec!(20));
        assert_eq!(plan.allocations[1].source_type, SourceType::Universe);
    }

    #[test]
    fn nothing_available_is_unresolved() {
        let fx = fixture();
        let plan = resolve_one(&fx, dec!(5), 1);
        assert_eq!(plan.status, PlanStatus::Unresolved);
        assert_eq!(plan.shortfall, dec!(5));
        assert!(plan.allocations.is_empty());
    }

    #[test]
    fn inaccessible_stock_is_ignored() {
        let mut fx = fixture();
        let _ = fx.ledger.credit(fx.item, LocationId::new(), dec!(100), None);
        let plan = resolve_one(&fx, dec!(5), 1);
        assert!(!plan.is_resolved());
    }

    #[test]
    fn reserved_stock_is_not_available() {
        let mut fx = fixture();
        let loc = stock_at(&mut fx, dec!(10));
        let _ = fx.ledger.reserve(fx.item, loc, dec!(8), None);
        let plan = resolve_one(&fx, dec!(5), 1);
        assert_eq!(plan.shortfall, dec!(3));
    }

    #[test]
    fn larger_stock_rows_are_drawn_first() {
        let mut fx = fixture();
        let small = stock_at(&mut fx, dec!(4));
        let large = stock_at(&mut fx, dec!(9));
        let plan = resolve_one(&fx, dec!(12), 1);
        assert!(plan.is_resolved());
        assert_eq!(
            plan.allocations,
            vec![Allocation::stock(large, dec!(9)), Allocation::stock(small, dec!(3))]
        );
    }

    #[test]
    fn multiplier_scales_requirement() {
        let mut fx = fixture();
        let _ = stock_at(&mut fx, dec!(100));
        let plan = resolve_one(&fx, dec!(10), 3);
        assert_eq!(plan.required_quantity, dec!(30));
        assert!(plan.is_resolved());
    }

    #[test]
    fn source_must_cover_whole_remainder() {
        let mut fx = fixture();
        fx.sources.push(source(fx.item, dec!(4), dec!(1)));
        let plan = resolve_one(&fx, dec!(5), 1);
        assert!(!plan.is_resolved());
        assert_eq!(plan.shortfall, dec!(5));
    }

    #[test]
    fn sources_rank_by_reliability_cost_and_freshness() {
        let item = ItemId::new();
        let now = Utc::now();

        let mut cheap = source(item, dec!(10), dec!(0.5));
        cheap.cost_per_unit = Some(dec!(1));
        let mut pricey = source(item, dec!(10), dec!(0.5));
        pricey.cost_per_unit = Some(dec!(9));
        let unpriced = source(item, dec!(10), dec!(0.5));
        let reliable = source(item, dec!(10), dec!(0.9));
        let mut stale = source(item, dec!(10), dec!(0.5));
        stale.cost_per_unit = Some(dec!(1));
        stale.last_verified = Some(now - Duration::days(3));
        cheap.last_verified = Some(now);

        let all = vec![
            unpriced.clone(),
            pricey.clone(),
            stale.clone(),
            cheap.clone(),
            reliable.clone(),
        ];
        let ranked: Vec<ResourceSourceId> =
            rank_sources(&all, item).into_iter().map(|s| s.id).collect();
        assert_eq!(
            ranked,
            vec![reliable.id, cheap.id, stale.id, pricey.id, unpriced.id]
        );
    }

    #[test]
    fn feasibility_ignores_optional_shortfall() {
        let plans = vec![IngredientPlan {
            item_id: ItemId::new(),
            required_quantity: dec!(1),
            optional: true,
            allocations: Vec::new(),
            shortfall: dec!(1),
            status: PlanStatus::Unresolved,
        }];
        assert!(is_feasible(&plans));
        assert_eq!(required_shortfall(&plans), Decimal::ZERO);
    }
}
