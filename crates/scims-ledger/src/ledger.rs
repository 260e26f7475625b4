//! The stock ledger working set.
//!
//! A [`StockLedger`] holds [`ItemStock`] rows keyed by (item, location) and
//! the journal of movements applied since it was loaded. Persistent stores
//! load the rows a transition touches (locked), run the transition against
//! the working set, then write back the touched rows and the journal inside
//! the same database transaction.
//!
//! # Design
//!
//! - **Copy-validate-commit**: each mutation validates a copy of the row and
//!   only replaces the stored row when every check passes.
//! - **Group atomicity**: [`StockLedger::apply_atomic`] runs several
//!   mutations on a scratch copy and keeps them only if all succeed.
//! - **Precision**: all quantities use [`Decimal`] -- no floating point.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;

use scims_types::{CraftId, ItemId, ItemStock, LocationId, MovementKind, StockMovement};

use crate::invariants::{InvariantReport, check_entries};
use crate::{LedgerError, MovementBuilder};

/// Key of one ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StockKey {
    /// Stocked item.
    pub item_id: ItemId,
    /// Holding location.
    pub location_id: LocationId,
}

impl StockKey {
    /// Build a key for `(item_id, location_id)`.
    pub const fn new(item_id: ItemId, location_id: LocationId) -> Self {
        Self {
            item_id,
            location_id,
        }
    }
}

impl From<&ItemStock> for StockKey {
    fn from(row: &ItemStock) -> Self {
        Self::new(row.item_id, row.location_id)
    }
}

// ---------------------------------------------------------------------------
// StockLedger
// ---------------------------------------------------------------------------

/// Available/reserved quantities per (item, location) plus the movement
/// journal of everything applied to this working set.
#[derive(Debug, Clone, Default)]
pub struct StockLedger {
    /// Rows ordered by (item, location).
    entries: BTreeMap<StockKey, ItemStock>,
    /// Movements applied since load, in order.
    movements: Vec<StockMovement>,
}

impl StockLedger {
    /// Create an empty ledger.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            movements: Vec::new(),
        }
    }

    /// Build a working set from loaded rows. The journal starts empty.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = ItemStock>,
    {
        let entries = rows
            .into_iter()
            .map(|row| (StockKey::from(&row), row))
            .collect();
        Self {
            entries,
            movements: Vec::new(),
        }
    }

    /// Number of rows in the working set.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the working set has no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The row for `(item_id, location_id)`, if present.
    pub fn get(&self, item_id: ItemId, location_id: LocationId) -> Option<&ItemStock> {
        self.entries.get(&StockKey::new(item_id, location_id))
    }

    /// `(quantity, reserved_quantity)` for a row; zeros when absent.
    pub fn levels(&self, item_id: ItemId, location_id: LocationId) -> (Decimal, Decimal) {
        self.get(item_id, location_id)
            .map_or((Decimal::ZERO, Decimal::ZERO), |row| {
                (row.quantity, row.reserved_quantity)
            })
    }

    /// Available (unreserved) quantity for a row; zero when absent.
    pub fn available(&self, item_id: ItemId, location_id: LocationId) -> Decimal {
        self.get(item_id, location_id)
            .map_or(Decimal::ZERO, ItemStock::available_quantity)
    }

    /// All rows, ordered by (item, location).
    pub fn rows(&self) -> impl Iterator<Item = &ItemStock> {
        self.entries.values()
    }

    /// Rows holding `item_id`, ordered by location.
    pub fn rows_for_item(&self, item_id: ItemId) -> impl Iterator<Item = &ItemStock> {
        self.entries
            .values()
            .filter(move |row| row.item_id == item_id)
    }

    /// Insert or replace a row without journaling (used when loading).
    pub fn load_row(&mut self, row: ItemStock) {
        self.entries.insert(StockKey::from(&row), row);
    }

    /// Movements applied to this working set, in order.
    pub fn movements(&self) -> &[StockMovement] {
        &self.movements
    }

    /// Drain the movement journal, leaving it empty.
    pub fn take_movements(&mut self) -> Vec<StockMovement> {
        core::mem::take(&mut self.movements)
    }

    /// Keys of every row touched by a journaled movement.
    pub fn touched_keys(&self) -> BTreeSet<StockKey> {
        self.movements
            .iter()
            .map(|m| StockKey::new(m.item_id, m.location_id))
            .collect()
    }

    /// Rows touched by a journaled movement, in key order.
    pub fn touched_rows(&self) -> Vec<&ItemStock> {
        self.touched_keys()
            .iter()
            .filter_map(|key| self.entries.get(key))
            .collect()
    }

    /// Sum of `reserved_quantity` over all rows (saturating).
    pub fn total_reserved(&self) -> Decimal {
        self.entries
            .values()
            .fold(Decimal::ZERO, |acc, row| {
                acc.checked_add(row.reserved_quantity).unwrap_or(Decimal::MAX)
            })
    }

    /// Check `0 <= reserved <= quantity` over every row.
    pub fn verify(&self) -> InvariantReport {
        check_entries(self.entries.values())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Earmark `amount` of available stock.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientStock`] when `amount` exceeds the
    /// available quantity, [`LedgerError::NonPositiveQuantity`] for
    /// non-positive amounts.
    pub fn reserve(
        &mut self,
        item_id: ItemId,
        location_id: LocationId,
        amount: Decimal,
        craft_id: Option<CraftId>,
    ) -> Result<&ItemStock, LedgerError> {
        let movement = MovementBuilder::new(MovementKind::Reserve, item_id, location_id)
            .quantity(amount)
            .craft(craft_id)
            .build()?;
        let mut row = self.row_or_empty(item_id, location_id);

        let available = row.available_quantity();
        if amount > available {
            tracing::debug!(
                %item_id,
                %location_id,
                requested = %amount,
                available = %available,
                "reservation rejected"
            );
            return Err(LedgerError::InsufficientStock {
                item_id,
                location_id,
                requested: amount,
                available,
            });
        }

        row.reserved_quantity = row
            .reserved_quantity
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow {
                context: "reserve: reserved_quantity",
            })?;

        self.commit(row, movement)
    }

    /// Return `amount` of reserved stock to availability.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvariantViolation`] when fewer than `amount`
    /// units are reserved.
    pub fn release(
        &mut self,
        item_id: ItemId,
        location_id: LocationId,
        amount: Decimal,
        craft_id: Option<CraftId>,
    ) -> Result<&ItemStock, LedgerError> {
        let movement = MovementBuilder::new(MovementKind::Release, item_id, location_id)
            .quantity(amount)
            .craft(craft_id)
            .build()?;
        let mut row = self.row_or_empty(item_id, location_id);

        if amount > row.reserved_quantity {
            return Err(violation(
                item_id,
                location_id,
                format!(
                    "release of {amount} exceeds reserved quantity {}",
                    row.reserved_quantity
                ),
            ));
        }

        row.reserved_quantity = row
            .reserved_quantity
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow {
                context: "release: reserved_quantity",
            })?;

        self.commit(row, movement)
    }

    /// Deduct `amount` of previously reserved stock (craft completion).
    ///
    /// Decrements both `quantity` and `reserved_quantity`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvariantViolation`] when fewer than `amount`
    /// units are reserved.
    pub fn consume(
        &mut self,
        item_id: ItemId,
        location_id: LocationId,
        amount: Decimal,
        craft_id: Option<CraftId>,
    ) -> Result<&ItemStock, LedgerError> {
        let movement = MovementBuilder::new(MovementKind::Consume, item_id, location_id)
            .quantity(amount)
            .craft(craft_id)
            .build()?;
        let mut row = self.row_or_empty(item_id, location_id);

        if amount > row.reserved_quantity {
            return Err(violation(
                item_id,
                location_id,
                format!(
                    "consume of {amount} exceeds reserved quantity {}",
                    row.reserved_quantity
                ),
            ));
        }

        row.reserved_quantity = row
            .reserved_quantity
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow {
                context: "consume: reserved_quantity",
            })?;
        row.quantity = row
            .quantity
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow {
                context: "consume: quantity",
            })?;

        self.commit(row, movement)
    }

    /// Add `amount` to stock on hand, creating the row if needed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NonPositiveQuantity`] for non-positive amounts.
    pub fn credit(
        &mut self,
        item_id: ItemId,
        location_id: LocationId,
        amount: Decimal,
        craft_id: Option<CraftId>,
    ) -> Result<&ItemStock, LedgerError> {
        let movement = MovementBuilder::new(MovementKind::Credit, item_id, location_id)
            .quantity(amount)
            .craft(craft_id)
            .build()?;
        let mut row = self.row_or_empty(item_id, location_id);

        row.quantity = row
            .quantity
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow {
                context: "credit: quantity",
            })?;

        self.commit(row, movement)
    }

    /// Apply a signed manual correction to stock on hand.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientStock`] when a decrease would drop
    /// `quantity` below `reserved_quantity`, and
    /// [`LedgerError::NonPositiveQuantity`] for a zero delta.
    pub fn adjust(
        &mut self,
        item_id: ItemId,
        location_id: LocationId,
        delta: Decimal,
        reason: &str,
    ) -> Result<&ItemStock, LedgerError> {
        let movement = MovementBuilder::new(MovementKind::Adjust, item_id, location_id)
            .quantity(delta)
            .reason(reason)
            .build()?;
        let mut row = self.row_or_empty(item_id, location_id);

        let new_quantity = row
            .quantity
            .checked_add(delta)
            .ok_or(LedgerError::ArithmeticOverflow {
                context: "adjust: quantity",
            })?;
        if new_quantity < row.reserved_quantity {
            return Err(LedgerError::InsufficientStock {
                item_id,
                location_id,
                requested: delta.abs(),
                available: row.available_quantity(),
            });
        }
        row.quantity = new_quantity;

        self.commit(row, movement)
    }

    /// Run `f` against a scratch copy; keep its effects only if it succeeds.
    ///
    /// This is the in-memory counterpart of a database transaction: a
    /// failing step leaves `self` exactly as it was.
    ///
    /// # Errors
    ///
    /// Propagates whatever error `f` returns.
    pub fn apply_atomic<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        let mut scratch = self.clone();
        let value = f(&mut scratch)?;
        *self = scratch;
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn row_or_empty(&self, item_id: ItemId, location_id: LocationId) -> ItemStock {
        self.get(item_id, location_id)
            .cloned()
            .unwrap_or_else(|| ItemStock::empty(item_id, location_id))
    }

    /// Store a validated row and journal the movement that produced it.
    fn commit(
        &mut self,
        mut row: ItemStock,
        movement: StockMovement,
    ) -> Result<&ItemStock, LedgerError> {
        if !row.is_consistent() {
            return Err(violation(
                row.item_id,
                row.location_id,
                format!(
                    "quantity {} / reserved {} after {}",
                    row.quantity, row.reserved_quantity, movement.kind
                ),
            ));
        }

        row.updated_at = movement.created_at;
        tracing::trace!(
            kind = %movement.kind,
            item_id = %row.item_id,
            location_id = %row.location_id,
            quantity = %movement.quantity,
            "stock movement applied"
        );
        self.movements.push(movement);

        let slot = match self.entries.entry(StockKey::from(&row)) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(row);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(row),
        };
        Ok(slot)
    }
}

/// Build (and log) an invariant violation.
fn violation(item_id: ItemId, location_id: LocationId, detail: String) -> LedgerError {
    tracing::error!(%item_id, %location_id, detail = %detail, "stock ledger invariant violation");
    LedgerError::InvariantViolation {
        item_id,
        location_id,
        detail,
    }
}
