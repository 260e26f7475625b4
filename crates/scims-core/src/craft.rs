//! Craft lifecycle state machine.
//!
//! ```text
//! planned --start--> in_progress --complete--> completed
//!    |                    |
//!    +------cancel--------+--> cancelled
//! ```
//!
//! Every transition operates on a [`CraftRecord`] and a [`StockLedger`]
//! working set. Ledger effects run inside [`StockLedger::apply_atomic`], and
//! the record is only mutated after the ledger step succeeds, so a failed
//! transition leaves both untouched.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use scims_ledger::StockLedger;
use scims_types::{
    Blueprint, BlueprintId, Craft, CraftId, CraftIngredient, CraftIngredientId, CraftStatus,
    FulfillmentStatus, IngredientPlan, ItemId, LocationId, OrganizationId, UserId,
};

use crate::error::CraftError;

/// Request to plan a new craft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCraft {
    /// Blueprint to execute.
    pub blueprint_id: BlueprintId,
    /// User requesting the craft; determines the access scope.
    pub requester_id: UserId,
    /// Organization the craft is run for, if any.
    pub organization_id: Option<OrganizationId>,
    /// Scheduling priority (higher runs first).
    pub priority: i32,
    /// Earliest start time; when set, readiness is measured from here.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Where the output is credited.
    pub output_location_id: LocationId,
}

/// A craft together with its ingredient rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CraftRecord {
    /// The craft header.
    pub craft: Craft,
    /// One row per blueprint ingredient, in blueprint order.
    pub ingredients: Vec<CraftIngredient>,
}

impl CraftRecord {
    /// Craft identifier.
    pub const fn id(&self) -> CraftId {
        self.craft.id
    }

    /// Current status.
    pub const fn status(&self) -> CraftStatus {
        self.craft.status
    }

    /// When the craft finishes, given the blueprint's crafting time.
    ///
    /// Measured from `scheduled_start` when set, otherwise from
    /// `started_at`. `None` until the craft has a base time.
    pub fn ready_at(&self, crafting_time_minutes: u32) -> Option<DateTime<Utc>> {
        let base = self.craft.scheduled_start.or(self.craft.started_at)?;
        let duration = TimeDelta::try_minutes(i64::from(crafting_time_minutes))?;
        base.checked_add_signed(duration)
    }

    /// Whether the craft is in progress and its crafting time has elapsed.
    pub fn is_ready(&self, crafting_time_minutes: u32, now: DateTime<Utc>) -> bool {
        self.craft.status == CraftStatus::InProgress
            && self
                .ready_at(crafting_time_minutes)
                .is_some_and(|at| at <= now)
    }

    /// Ingredient rows currently holding a ledger reservation.
    pub fn reserved_ingredients(&self) -> impl Iterator<Item = &CraftIngredient> {
        self.ingredients
            .iter()
            .filter(|i| i.status == FulfillmentStatus::Reserved)
    }

    /// Whether an ingredient takes part in start/complete. Optional
    /// ingredients left unresolved at planning time are skipped.
    fn participates(ingredient: &CraftIngredient) -> bool {
        !(ingredient.optional && ingredient.is_unresolved())
    }
}

/// Stock deducted for one ingredient at completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedStock {
    /// Ingredient item.
    pub item_id: ItemId,
    /// Location it was taken from.
    pub location_id: LocationId,
    /// Amount consumed.
    pub quantity: Decimal,
}

/// Ledger effects of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReceipt {
    /// Completed craft.
    pub craft_id: CraftId,
    /// Item produced.
    pub output_item_id: ItemId,
    /// Where it was credited.
    pub output_location_id: LocationId,
    /// Amount credited.
    pub output_quantity: Decimal,
    /// Stock consumed per ingredient allocation.
    pub consumed: Vec<ConsumedStock>,
    /// Completion timestamp.
    pub completed_at: DateTime<Utc>,
}

/// Result of a completion attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// The craft moved to `completed` in this call.
    Completed(CompletionReceipt),
    /// The craft was already completed; nothing changed.
    AlreadyCompleted {
        /// The craft concerned.
        craft_id: CraftId,
    },
}

impl CompletionOutcome {
    /// Whether this call performed the completion.
    pub const fn is_completed_now(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Build a `planned` craft from resolved ingredient plans.
///
/// `plans` must be in blueprint ingredient order, as returned by
/// [`Resolver::resolve`](crate::resolver::Resolver::resolve).
pub fn plan_craft(request: &NewCraft, plans: Vec<IngredientPlan>, now: DateTime<Utc>) -> CraftRecord {
    let craft_id = CraftId::new();
    let ingredients = plans
        .into_iter()
        .map(|plan| CraftIngredient {
            id: CraftIngredientId::new(),
            craft_id,
            item_id: plan.item_id,
            required_quantity: plan.required_quantity,
            source_location_id: plan.allocations.first().and_then(|a| a.location_id),
            source_type: plan.primary_source(),
            status: FulfillmentStatus::Pending,
            optional: plan.optional,
            shortfall: plan.shortfall,
            allocations: plan.allocations,
        })
        .collect();

    CraftRecord {
        craft: Craft {
            id: craft_id,
            blueprint_id: request.blueprint_id,
            requester_id: request.requester_id,
            organization_id: request.organization_id,
            status: CraftStatus::Planned,
            priority: request.priority,
            scheduled_start: request.scheduled_start,
            started_at: None,
            completed_at: None,
            output_location_id: request.output_location_id,
            created_at: now,
            updated_at: now,
        },
        ingredients,
    }
}

/// `planned -> in_progress`: reserve every stock allocation.
///
/// # Errors
///
/// - [`CraftError::InvalidTransition`] unless the craft is `planned`.
/// - [`CraftError::UnresolvedIngredient`] when a required ingredient has a
///   shortfall.
/// - [`CraftError::InsufficientStock`] naming the first ingredient whose
///   reservation fails. Nothing is reserved in that case.
pub fn start_craft(
    record: &mut CraftRecord,
    ledger: &mut StockLedger,
    now: DateTime<Utc>,
) -> Result<(), CraftError> {
    ensure_transition(record, CraftStatus::InProgress)?;
    let craft_id = record.id();

    if let Some(missing) = record
        .ingredients
        .iter()
        .find(|i| !i.optional && i.is_unresolved())
    {
        return Err(CraftError::UnresolvedIngredient {
            craft_id,
            item_id: missing.item_id,
            shortfall: missing.shortfall,
        });
    }

    ledger.apply_atomic(|working| {
        for ingredient in record
            .ingredients
            .iter()
            .filter(|i| CraftRecord::participates(i))
        {
            for (location_id, quantity) in ingredient.stock_allocations() {
                working
                    .reserve(ingredient.item_id, location_id, quantity, Some(craft_id))
                    .map_err(|e| CraftError::from_ledger(craft_id, e))?;
            }
        }
        Ok::<(), CraftError>(())
    })?;

    for ingredient in &mut record.ingredients {
        if CraftRecord::participates(ingredient) && ingredient.uses_stock() {
            ingredient.status = FulfillmentStatus::Reserved;
        }
    }
    record.craft.status = CraftStatus::InProgress;
    record.craft.started_at = Some(now);
    record.craft.updated_at = now;

    tracing::info!(%craft_id, "craft started");
    Ok(())
}

/// `in_progress -> completed`: consume reservations and credit the output.
///
/// Completing an already completed craft is a no-op returning
/// [`CompletionOutcome::AlreadyCompleted`]. `completed_at` never precedes
/// `started_at`. The caller increments the blueprint's usage count when the
/// outcome is [`CompletionOutcome::Completed`].
///
/// # Errors
///
/// - [`CraftError::InvalidTransition`] from `planned` or `cancelled`.
/// - [`CraftError::InvariantViolation`] when `blueprint` is not the craft's
///   blueprint or the ledger rejects the consumption.
pub fn complete_craft(
    record: &mut CraftRecord,
    blueprint: &Blueprint,
    ledger: &mut StockLedger,
    now: DateTime<Utc>,
) -> Result<CompletionOutcome, CraftError> {
    let craft_id = record.id();
    if record.status() == CraftStatus::Completed {
        return Ok(CompletionOutcome::AlreadyCompleted { craft_id });
    }
    ensure_transition(record, CraftStatus::Completed)?;

    if blueprint.id != record.craft.blueprint_id {
        return Err(CraftError::InvariantViolation {
            craft_id,
            detail: format!(
                "blueprint {} does not match craft blueprint {}",
                blueprint.id, record.craft.blueprint_id
            ),
        });
    }

    let output_location_id = record.craft.output_location_id;
    let consumed = ledger.apply_atomic(|working| {
        let mut consumed = Vec::new();
        for ingredient in record.reserved_ingredients() {
            for (location_id, quantity) in ingredient.stock_allocations() {
                working
                    .consume(ingredient.item_id, location_id, quantity, Some(craft_id))
                    .map_err(|e| CraftError::from_ledger(craft_id, e))
                    .map_err(|e| as_invariant(craft_id, e))?;
                consumed.push(ConsumedStock {
                    item_id: ingredient.item_id,
                    location_id,
                    quantity,
                });
            }
        }
        working
            .credit(
                blueprint.output_item_id,
                output_location_id,
                blueprint.output_quantity,
                Some(craft_id),
            )
            .map_err(|e| CraftError::from_ledger(craft_id, e))
            .map_err(|e| as_invariant(craft_id, e))?;
        Ok::<_, CraftError>(consumed)
    })?;

    for ingredient in &mut record.ingredients {
        let externally_sourced = ingredient.status == FulfillmentStatus::Pending
            && !ingredient.allocations.is_empty()
            && !ingredient.is_unresolved();
        if ingredient.status == FulfillmentStatus::Reserved || externally_sourced {
            ingredient.status = FulfillmentStatus::Fulfilled;
        }
    }

    let completed_at = record.craft.started_at.map_or(now, |started| now.max(started));
    record.craft.status = CraftStatus::Completed;
    record.craft.completed_at = Some(completed_at);
    record.craft.updated_at = now;

    tracing::info!(
        %craft_id,
        output_item_id = %blueprint.output_item_id,
        output_quantity = %blueprint.output_quantity,
        "craft completed"
    );

    Ok(CompletionOutcome::Completed(CompletionReceipt {
        craft_id,
        output_item_id: blueprint.output_item_id,
        output_location_id,
        output_quantity: blueprint.output_quantity,
        consumed,
        completed_at,
    }))
}

/// `planned | in_progress -> cancelled`: release every reservation.
///
/// # Errors
///
/// Returns [`CraftError::InvalidTransition`] from a terminal status and
/// [`CraftError::InvariantViolation`] if a release is rejected.
pub fn cancel_craft(
    record: &mut CraftRecord,
    ledger: &mut StockLedger,
    now: DateTime<Utc>,
) -> Result<(), CraftError> {
    ensure_transition(record, CraftStatus::Cancelled)?;
    let craft_id = record.id();

    ledger.apply_atomic(|working| {
        for ingredient in record.reserved_ingredients() {
            for (location_id, quantity) in ingredient.stock_allocations() {
                working
                    .release(ingredient.item_id, location_id, quantity, Some(craft_id))
                    .map_err(|e| CraftError::from_ledger(craft_id, e))
                    .map_err(|e| as_invariant(craft_id, e))?;
            }
        }
        Ok::<(), CraftError>(())
    })?;

    for ingredient in &mut record.ingredients {
        if ingredient.status == FulfillmentStatus::Reserved {
            ingredient.status = FulfillmentStatus::Pending;
        }
    }
    record.craft.status = CraftStatus::Cancelled;
    record.craft.updated_at = now;

    tracing::info!(%craft_id, "craft cancelled");
    Ok(())
}

fn ensure_transition(record: &CraftRecord, to: CraftStatus) -> Result<(), CraftError> {
    let from = record.status();
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(CraftError::InvalidTransition {
            craft_id: record.id(),
            from,
            to,
        })
    }
}

/// Reserved stock that cannot be consumed or released means the ledger and
/// the craft disagree.
fn as_invariant(craft_id: CraftId, err: CraftError) -> CraftError {
    match err {
        CraftError::InsufficientStock {
            item_id,
            location_id,
            requested,
            available,
            ..
        } => {
            tracing::error!(
                %craft_id,
                %item_id,
                %location_id,
                %requested,
                %available,
                "reserved stock missing from ledger"
            );
            CraftError::InvariantViolation {
                craft_id,
                detail: format!(
                    "reserved stock missing for {item_id} at {location_id}: requested {requested}, held {available}"
                ),
            }
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;
    use rust_decimal_macros::dec;
    use scims_types::{BlueprintIngredient, ResourceSource, ResourceSourceId, ResourceSourceType, Visibility};

    use super::*;
    use crate::location::LocationGraph;
    use crate::resolver::Resolver;

    struct Scenario {
        ledger: StockLedger,
        blueprint: Blueprint,
        hangar: LocationId,
        metal: ItemId,
        crystal: ItemId,
        user: UserId,
    }

    /// Widget = 10 Metal + 2 Crystal; hangar holds 100 Metal and 5 Crystal.
    fn scenario() -> Scenario {
        let hangar = LocationId::new();
        let metal = ItemId::new();
        let crystal = ItemId::new();
        let mut ledger = StockLedger::new();
        ledger.credit(metal, hangar, dec!(100), None).unwrap();
        ledger.credit(crystal, hangar, dec!(5), None).unwrap();
        let _ = ledger.take_movements();

        let user = UserId::new();
        let blueprint = Blueprint {
            id: BlueprintId::new(),
            name: String::from("Widget"),
            output_item_id: ItemId::new(),
            output_quantity: dec!(1),
            crafting_time_minutes: 30,
            ingredients: vec![
                BlueprintIngredient {
                    item_id: metal,
                    quantity: dec!(10),
                    optional: false,
                },
                BlueprintIngredient {
                    item_id: crystal,
                    quantity: dec!(2),
                    optional: false,
                },
            ],
            visibility: Visibility::Public,
            owner_id: Some(user),
            usage_count: 0,
            created_at: Utc::now(),
        };

        Scenario {
            ledger,
            blueprint,
            hangar,
            metal,
            crystal,
            user,
        }
    }

    fn plan(sc: &Scenario, sources: &[ResourceSource]) -> CraftRecord {
        let graph = LocationGraph::new();
        let scope = BTreeSet::from([sc.hangar]);
        let plans = Resolver::new(&sc.ledger, sources, &graph, &scope).resolve(&sc.blueprint, 1);
        let request = NewCraft {
            blueprint_id: sc.blueprint.id,
            requester_id: sc.user,
            organization_id: None,
            priority: 0,
            scheduled_start: None,
            output_location_id: sc.hangar,
        };
        plan_craft(&request, plans, Utc::now())
    }

    #[test]
    fn widget_lifecycle_moves_stock() {
        let mut sc = scenario();
        let mut record = plan(&sc, &[]);
        assert_eq!(record.status(), CraftStatus::Planned);
        assert!(record
            .ingredients
            .iter()
            .all(|i| i.status == FulfillmentStatus::Pending));

        let now = Utc::now();
        start_craft(&mut record, &mut sc.ledger, now).unwrap();
        assert_eq!(record.status(), CraftStatus::InProgress);
        assert_eq!(sc.ledger.levels(sc.metal, sc.hangar), (dec!(100), dec!(10)));
        assert_eq!(sc.ledger.levels(sc.crystal, sc.hangar), (dec!(5), dec!(2)));
        assert!(record
            .ingredients
            .iter()
            .all(|i| i.status == FulfillmentStatus::Reserved));

        let outcome = complete_craft(&mut record, &sc.blueprint, &mut sc.ledger, now).unwrap();
        assert!(outcome.is_completed_now());
        assert_eq!(sc.ledger.levels(sc.metal, sc.hangar), (dec!(90), dec!(0)));
        assert_eq!(sc.ledger.levels(sc.crystal, sc.hangar), (dec!(3), dec!(0)));
        assert_eq!(
            sc.ledger.levels(sc.blueprint.output_item_id, sc.hangar),
            (dec!(1), dec!(0))
        );
        assert!(record
            .ingredients
            .iter()
            .all(|i| i.status == FulfillmentStatus::Fulfilled));
        assert!(sc.ledger.verify().is_consistent());
    }

    #[test]
    fn failed_start_leaves_everything_unchanged() {
        let mut sc = scenario();
        let mut record = plan(&sc, &[]);
        // Another craft takes most of the crystal after planning.
        sc.ledger.reserve(sc.crystal, sc.hangar, dec!(4), None).unwrap();
        let before_ledger = sc.ledger.clone();
        let before_record = record.clone();

        let err = start_craft(&mut record, &mut sc.ledger, Utc::now()).unwrap_err();
        match err {
            CraftError::InsufficientStock { item_id, .. } => assert_eq!(item_id, sc.crystal),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(record, before_record);
        assert_eq!(sc.ledger.levels(sc.metal, sc.hangar), before_ledger.levels(sc.metal, sc.hangar));
        assert_eq!(sc.ledger.movements().len(), before_ledger.movements().len());
    }

    #[test]
    fn unresolved_required_ingredient_blocks_start() {
        let mut sc = scenario();
        sc.blueprint.ingredients[1].quantity = dec!(50);
        let mut record = plan(&sc, &[]);
        let err = start_craft(&mut record, &mut sc.ledger, Utc::now()).unwrap_err();
        assert!(matches!(err, CraftError::UnresolvedIngredient { .. }));
        assert!(err.is_recoverable());
        assert_eq!(record.status(), CraftStatus::Planned);
    }

    #[test]
    fn optional_unresolved_ingredient_is_skipped() {
        let mut sc = scenario();
        sc.blueprint.ingredients[1].quantity = dec!(50);
        sc.blueprint.ingredients[1].optional = true;
        let mut record = plan(&sc, &[]);
        let now = Utc::now();
        start_craft(&mut record, &mut sc.ledger, now).unwrap();
        assert_eq!(sc.ledger.levels(sc.crystal, sc.hangar), (dec!(5), dec!(0)));
        assert_eq!(record.ingredients[1].status, FulfillmentStatus::Pending);

        complete_craft(&mut record, &sc.blueprint, &mut sc.ledger, now).unwrap();
        assert_eq!(record.ingredients[1].status, FulfillmentStatus::Pending);
        assert_eq!(record.ingredients[0].status, FulfillmentStatus::Fulfilled);
    }

    #[test]
    fn double_complete_is_noop() {
        let mut sc = scenario();
        let mut record = plan(&sc, &[]);
        let now = Utc::now();
        start_craft(&mut record, &mut sc.ledger, now).unwrap();
        complete_craft(&mut record, &sc.blueprint, &mut sc.ledger, now).unwrap();
        let after_first = sc.ledger.clone();

        let second = complete_craft(&mut record, &sc.blueprint, &mut sc.ledger, now).unwrap();
        assert_eq!(
            second,
            CompletionOutcome::AlreadyCompleted {
                craft_id: record.id()
            }
        );
        assert_eq!(
            sc.ledger.levels(sc.blueprint.output_item_id, sc.hangar),
            after_first.levels(sc.blueprint.output_item_id, sc.hangar)
        );
        assert_eq!(sc.ledger.movements().len(), after_first.movements().len());
    }

    #[test]
    fn cancel_returns_exactly_what_was_reserved() {
        let mut sc = scenario();
        let mut record = plan(&sc, &[]);
        start_craft(&mut record, &mut sc.ledger, Utc::now()).unwrap();
        cancel_craft(&mut record, &mut sc.ledger, Utc::now()).unwrap();

        assert_eq!(record.status(), CraftStatus::Cancelled);
        assert_eq!(sc.ledger.levels(sc.metal, sc.hangar), (dec!(100), dec!(0)));
        assert_eq!(sc.ledger.levels(sc.crystal, sc.hangar), (dec!(5), dec!(0)));
        assert!(record
            .ingredients
            .iter()
            .all(|i| i.status == FulfillmentStatus::Pending));
    }

    #[test]
    fn cancel_planned_craft_touches_nothing() {
        let mut sc = scenario();
        let mut record = plan(&sc, &[]);
        cancel_craft(&mut record, &mut sc.ledger, Utc::now()).unwrap();
        assert_eq!(record.status(), CraftStatus::Cancelled);
        assert!(sc.ledger.movements().is_empty());
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut sc = scenario();
        let mut record = plan(&sc, &[]);
        cancel_craft(&mut record, &mut sc.ledger, Utc::now()).unwrap();

        assert!(matches!(
            start_craft(&mut record, &mut sc.ledger, Utc::now()),
            Err(CraftError::InvalidTransition { .. })
        ));
        assert!(matches!(
            cancel_craft(&mut record, &mut sc.ledger, Utc::now()),
            Err(CraftError::InvalidTransition { .. })
        ));
        assert!(matches!(
            complete_craft(&mut record, &sc.blueprint, &mut sc.ledger, Utc::now()),
            Err(CraftError::InvalidTransition {
                from: CraftStatus::Cancelled,
                ..
            })
        ));
    }

    #[test]
    fn complete_requires_start() {
        let mut sc = scenario();
        let mut record = plan(&sc, &[]);
        assert!(matches!(
            complete_craft(&mut record, &sc.blueprint, &mut sc.ledger, Utc::now()),
            Err(CraftError::InvalidTransition {
                from: CraftStatus::Planned,
                ..
            })
        ));
    }

    #[test]
    fn completed_at_never_precedes_start() {
        let mut sc = scenario();
        let mut record = plan(&sc, &[]);
        let started = Utc::now();
        start_craft(&mut record, &mut sc.ledger, started).unwrap();
        let earlier = started - Duration::minutes(5);
        complete_craft(&mut record, &sc.blueprint, &mut sc.ledger, earlier).unwrap();
        assert_eq!(record.craft.completed_at, Some(started));
    }

    #[test]
    fn externally_sourced_ingredient_is_fulfilled_without_ledger_effect() {
        let mut sc = scenario();
        let extra = ItemId::new();
        sc.blueprint.ingredients.push(BlueprintIngredient {
            item_id: extra,
            quantity: dec!(3),
            optional: false,
        });
        let source = ResourceSource {
            id: ResourceSourceId::new(),
            item_id: extra,
            source_type: ResourceSourceType::TradingPost,
            location_id: None,
            provider_id: None,
            available_quantity: dec!(10),
            cost_per_unit: Some(dec!(2)),
            reliability_score: dec!(0.7),
            last_verified: None,
        };
        let mut record = plan(&sc, &[source]);
        let now = Utc::now();
        start_craft(&mut record, &mut sc.ledger, now).unwrap();
        assert_eq!(record.ingredients[2].status, FulfillmentStatus::Pending);

        complete_craft(&mut record, &sc.blueprint, &mut sc.ledger, now).unwrap();
        assert_eq!(record.ingredients[2].status, FulfillmentStatus::Fulfilled);
        assert!(sc.ledger.get(extra, sc.hangar).is_none());
    }

    #[test]
    fn readiness_uses_scheduled_start_then_started_at() {
        let mut sc = scenario();
        let mut record = plan(&sc, &[]);
        let now = Utc::now();
        assert_eq!(record.ready_at(30), None);

        start_craft(&mut record, &mut sc.ledger, now).unwrap();
        assert!(!record.is_ready(30, now));
        assert!(record.is_ready(30, now + Duration::minutes(30)));

        record.craft.scheduled_start = Some(now + Duration::hours(1));
        assert!(!record.is_ready(30, now + Duration::minutes(30)));
        assert!(record.is_ready(30, now + Duration::minutes(90)));
    }
}
