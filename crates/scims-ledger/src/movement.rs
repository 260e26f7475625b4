//! Validated construction of stock movement journal entries.
//!
//! Every ledger mutation records a [`StockMovement`]. The [`MovementBuilder`]
//! rejects zero or negative amounts (adjustments may be negative but never
//! zero) before an entry reaches the journal.

use chrono::Utc;
use rust_decimal::Decimal;

use scims_types::{CraftId, ItemId, LocationId, MovementKind, StockMovement, StockMovementId};

use crate::LedgerError;

/// Builder for [`StockMovement`] values.
///
/// # Examples
///
/// ```
/// use scims_ledger::MovementBuilder;
/// use scims_types::{ItemId, LocationId, MovementKind};
/// use rust_decimal::Decimal;
///
/// let movement = MovementBuilder::new(MovementKind::Reserve, ItemId::new(), LocationId::new())
///     .quantity(Decimal::new(5, 0))
///     .build();
///
/// assert!(movement.is_ok());
/// ```
#[derive(Debug)]
pub struct MovementBuilder {
    kind: MovementKind,
    item_id: ItemId,
    location_id: LocationId,
    quantity: Option<Decimal>,
    craft_id: Option<CraftId>,
    reason: Option<String>,
}

impl MovementBuilder {
    /// Start building a movement of `kind` for one stock row.
    pub const fn new(kind: MovementKind, item_id: ItemId, location_id: LocationId) -> Self {
        Self {
            kind,
            item_id,
            location_id,
            quantity: None,
            craft_id: None,
            reason: None,
        }
    }

    /// Set the moved amount.
    #[must_use]
    pub const fn quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Attach the craft that caused the movement.
    #[must_use]
    pub const fn craft(mut self, craft_id: Option<CraftId>) -> Self {
        self.craft_id = craft_id;
        self
    }

    /// Override the default reason string.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Validate and produce the movement.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::MissingField`] when no quantity was set and
    /// [`LedgerError::NonPositiveQuantity`] when the amount is not allowed
    /// for the movement kind.
    pub fn build(self) -> Result<StockMovement, LedgerError> {
        let quantity = self.quantity.ok_or(LedgerError::MissingField("quantity"))?;

        let valid = match self.kind {
            MovementKind::Adjust => !quantity.is_zero(),
            MovementKind::Reserve
            | MovementKind::Release
            | MovementKind::Consume
            | MovementKind::Credit => quantity > Decimal::ZERO,
        };
        if !valid {
            return Err(LedgerError::NonPositiveQuantity { quantity });
        }

        let reason = self
            .reason
            .unwrap_or_else(|| default_reason(self.kind).to_owned());

        Ok(StockMovement {
            id: StockMovementId::new(),
            kind: self.kind,
            item_id: self.item_id,
            location_id: self.location_id,
            quantity,
            craft_id: self.craft_id,
            reason,
            created_at: Utc::now(),
        })
    }
}

/// Journal reason used when the caller supplies none.
const fn default_reason(kind: MovementKind) -> &'static str {
    match kind {
        MovementKind::Reserve => "CRAFT_START",
        MovementKind::Release => "CRAFT_CANCEL",
        MovementKind::Consume => "CRAFT_COMPLETE",
        MovementKind::Credit => "CRAFT_OUTPUT",
        MovementKind::Adjust => "MANUAL_ADJUST",
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn builder(kind: MovementKind) -> MovementBuilder {
        MovementBuilder::new(kind, ItemId::new(), LocationId::new())
    }

    #[test]
    fn reserve_requires_positive_amount() {
        let zero = builder(MovementKind::Reserve).quantity(Decimal::ZERO).build();
        assert!(matches!(zero, Err(LedgerError::NonPositiveQuantity { .. })));

        let negative = builder(MovementKind::Reserve).quantity(dec!(-1)).build();
        assert!(matches!(negative, Err(LedgerError::NonPositiveQuantity { .. })));
    }

    #[test]
    fn adjust_allows_negative_but_not_zero() {
        assert!(builder(MovementKind::Adjust).quantity(dec!(-4)).build().is_ok());
        assert!(builder(MovementKind::Adjust).quantity(Decimal::ZERO).build().is_err());
    }

    #[test]
    fn missing_quantity_is_reported() {
        let result = builder(MovementKind::Credit).build();
        assert_eq!(result, Err(LedgerError::MissingField("quantity")));
    }

    #[test]
    fn default_and_custom_reasons() {
        let craft = CraftId::new();
        let movement = builder(MovementKind::Consume)
            .quantity(dec!(2))
            .craft(Some(craft))
            .build();
        let movement = movement.ok();
        assert_eq!(movement.as_ref().map(|m| m.reason.as_str()), Some("CRAFT_COMPLETE"));
        assert_eq!(movement.and_then(|m| m.craft_id), Some(craft));

        let custom = builder(MovementKind::Adjust)
            .quantity(dec!(3))
            .reason("AUDIT")
            .build()
            .ok();
        assert_eq!(custom.map(|m| m.reason), Some("AUDIT".to_owned()));
    }
}
