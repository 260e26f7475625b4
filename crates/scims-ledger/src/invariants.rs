//! Ledger consistency checks.
//!
//! Two checks are provided:
//!
//! - [`check_entries`] -- every row satisfies `0 <= reserved <= quantity`.
//! - [`replay`] -- applying a movement journal to an opening working set
//!   reproduces the closing rows. This catches a stock row written without
//!   its movement (or a movement recorded without its row change).

use std::collections::BTreeSet;

use scims_types::{ItemStock, MovementKind, StockMovement};

use crate::{LedgerAnomaly, LedgerError, StockKey, StockLedger};

/// Result of a consistency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantReport {
    /// Every checked row is consistent.
    Consistent,
    /// One or more rows violate the invariant.
    Anomalies(Vec<LedgerAnomaly>),
}

impl InvariantReport {
    /// Whether no anomaly was found.
    pub const fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }

    /// The anomalies found, empty when consistent.
    pub fn anomalies(&self) -> &[LedgerAnomaly] {
        match self {
            Self::Consistent => &[],
            Self::Anomalies(list) => list,
        }
    }
}

/// Check `0 <= reserved_quantity <= quantity` over `rows`.
pub fn check_entries<'a, I>(rows: I) -> InvariantReport
where
    I: IntoIterator<Item = &'a ItemStock>,
{
    let anomalies: Vec<LedgerAnomaly> = rows
        .into_iter()
        .filter(|row| !row.is_consistent())
        .map(|row| LedgerAnomaly {
            item_id: row.item_id,
            location_id: row.location_id,
            quantity: row.quantity,
            reserved_quantity: row.reserved_quantity,
            message: format!(
                "STOCK_ANOMALY: item {} at {} has quantity {} and reserved {}",
                row.item_id, row.location_id, row.quantity, row.reserved_quantity
            ),
        })
        .collect();

    if anomalies.is_empty() {
        InvariantReport::Consistent
    } else {
        tracing::error!(count = anomalies.len(), "stock ledger anomalies detected");
        InvariantReport::Anomalies(anomalies)
    }
}

/// Replay `movements` onto a copy of `opening` and return the result.
///
/// # Errors
///
/// Returns the first [`LedgerError`] raised while re-applying a movement,
/// which means the journal could not have produced a consistent ledger.
pub fn replay(opening: &StockLedger, movements: &[StockMovement]) -> Result<StockLedger, LedgerError> {
    let mut ledger = StockLedger::from_rows(opening.rows().cloned());
    for m in movements {
        match m.kind {
            MovementKind::Reserve => {
                ledger.reserve(m.item_id, m.location_id, m.quantity, m.craft_id)?;
            }
            MovementKind::Release => {
                ledger.release(m.item_id, m.location_id, m.quantity, m.craft_id)?;
            }
            MovementKind::Consume => {
                ledger.consume(m.item_id, m.location_id, m.quantity, m.craft_id)?;
            }
            MovementKind::Credit => {
                ledger.credit(m.item_id, m.location_id, m.quantity, m.craft_id)?;
            }
            MovementKind::Adjust => {
                ledger.adjust(m.item_id, m.location_id, m.quantity, &m.reason)?;
            }
        }
    }
    Ok(ledger)
}

/// Keys whose `(quantity, reserved_quantity)` differ between two working
/// sets. Absent rows compare as zero; timestamps are ignored.
pub fn diff_quantities(expected: &StockLedger, actual: &StockLedger) -> Vec<StockKey> {
    let keys: BTreeSet<StockKey> = expected
        .rows()
        .chain(actual.rows())
        .map(StockKey::from)
        .collect();

    keys.into_iter()
        .filter(|key| {
            expected.levels(key.item_id, key.location_id)
                != actual.levels(key.item_id, key.location_id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use scims_types::{ItemId, LocationId};

    use super::*;

    #[test]
    fn consistent_rows_pass() {
        let mut row = ItemStock::empty(ItemId::new(), LocationId::new());
        row.quantity = dec!(10);
        row.reserved_quantity = dec!(10);
        assert_eq!(check_entries([&row]), InvariantReport::Consistent);
    }

    #[test]
    fn over_reserved_row_is_reported() {
        let mut row = ItemStock::empty(ItemId::new(), LocationId::new());
        row.quantity = dec!(3);
        row.reserved_quantity = dec!(4);
        let report = check_entries([&row]);
        assert!(!report.is_consistent());
        assert_eq!(report.anomalies().len(), 1);
        assert!(report.anomalies().iter().all(|a| a.message.starts_with("STOCK_ANOMALY")));
    }

    #[test]
    fn replay_reproduces_closing_state() {
        let item = ItemId::new();
        let loc = LocationId::new();
        let mut opening = StockLedger::new();
        opening.load_row(ItemStock {
            quantity: dec!(100),
            ..ItemStock::empty(item, loc)
        });

        let mut working = opening.clone();
        let _ = working.reserve(item, loc, dec!(30), None);
        let _ = working.consume(item, loc, dec!(30), None);
        let _ = working.credit(item, LocationId::new(), dec!(1), None);

        let replayed = replay(&opening, working.movements());
        assert!(replayed.is_ok());
        let replayed = replayed.unwrap_or_default();
        assert!(diff_quantities(&replayed, &working).is_empty());
        assert_eq!(replayed.len(), working.len());
    }

    #[test]
    fn replay_rejects_impossible_journal() {
        let item = ItemId::new();
        let loc = LocationId::new();
        let mut source = StockLedger::new();
        let _ = source.credit(item, loc, dec!(5), None);
        let _ = source.reserve(item, loc, dec!(5), None);

        // Replaying the reservation against an empty opening set must fail.
        let journal: Vec<_> = source.movements().iter().skip(1).cloned().collect();
        let result = replay(&StockLedger::new(), &journal);
        assert!(matches!(result, Err(LedgerError::InsufficientStock { .. })));
    }
}
