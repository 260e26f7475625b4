//! Stock ledger for SCIMS.
//!
//! The ledger is the authoritative available/reserved quantity record per
//! (item, location) pair. Crafts earmark stock with [`StockLedger::reserve`],
//! return it with [`StockLedger::release`], and deduct it at completion with
//! [`StockLedger::consume`]. Every mutation appends a
//! [`StockMovement`](scims_types::StockMovement) to the movement journal.
//!
//! # Modules
//!
//! - [`ledger`] -- The [`StockLedger`] working set and its mutations.
//! - [`movement`] -- The [`MovementBuilder`] for validated journal entries.
//! - [`invariants`] -- Consistency checks and journal replay.
//!
//! # Invariant
//!
//! For every entry, before and after every operation:
//!
//! ```text
//! 0 <= reserved_quantity <= quantity
//! ```
//!
//! A violation is an [`LedgerError::InvariantViolation`] -- a caller bug,
//! never retried. The ledger never panics; it returns errors.
//!
//! # Usage
//!
//! ```
//! use scims_ledger::StockLedger;
//! use scims_types::{ItemId, LocationId};
//! use rust_decimal::Decimal;
//!
//! let item = ItemId::new();
//! let hangar = LocationId::new();
//! let mut ledger = StockLedger::new();
//!
//! ledger.credit(item, hangar, Decimal::new(100, 0), None).ok();
//! ledger.reserve(item, hangar, Decimal::new(30, 0), None).ok();
//!
//! assert_eq!(ledger.available(item, hangar), Decimal::new(70, 0));
//! assert!(ledger.verify().is_consistent());
//! ```

pub mod invariants;
pub mod ledger;
pub mod movement;

// Re-export primary types at crate root.
pub use invariants::InvariantReport;
pub use ledger::{StockKey, StockLedger};
pub use movement::MovementBuilder;

use rust_decimal::Decimal;

use scims_types::{ItemId, LocationId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when mutating the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The requested amount exceeds what is available (recoverable).
    #[error(
        "insufficient stock of item {item_id} at location {location_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        /// Item being reserved or removed.
        item_id: ItemId,
        /// Location holding the stock.
        location_id: LocationId,
        /// Amount asked for.
        requested: Decimal,
        /// Amount actually available.
        available: Decimal,
    },

    /// A consistency rule would be broken. Indicates a bug in the caller.
    #[error("ledger invariant violated for item {item_id} at location {location_id}: {detail}")]
    InvariantViolation {
        /// Affected item.
        item_id: ItemId,
        /// Affected location.
        location_id: LocationId,
        /// What went wrong.
        detail: String,
    },

    /// Amounts must be strictly positive (adjustments: non-zero).
    #[error("ledger amount must be positive, got {quantity}")]
    NonPositiveQuantity {
        /// The rejected amount.
        quantity: Decimal,
    },

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Decimal arithmetic overflowed.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// What was being computed.
        context: &'static str,
    },
}

impl LedgerError {
    /// Whether the error indicates a bug rather than a user-recoverable state.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. } | Self::ArithmeticOverflow { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// An entry found violating `0 <= reserved_quantity <= quantity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAnomaly {
    /// Affected item.
    pub item_id: ItemId,
    /// Affected location.
    pub location_id: LocationId,
    /// Quantity on hand at detection time.
    pub quantity: Decimal,
    /// Reserved quantity at detection time.
    pub reserved_quantity: Decimal,
    /// Human-readable description.
    pub message: String,
}

impl core::fmt::Display for LedgerAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
