//! Error types for the crafting engine and the store contract.
//!
//! [`CraftError`] covers state-machine failures. [`StoreError`] is what
//! every [`ScimsStore`](crate::store::ScimsStore) operation returns; it wraps
//! the engine errors and adds lookup, validation and backend failures.

use rust_decimal::Decimal;
use uuid::Uuid;

use scims_ledger::LedgerError;
use scims_types::{CraftId, CraftStatus, ItemId, LocationId};

use crate::location::LocationError;

/// Errors raised by craft lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CraftError {
    /// An ingredient's stock could not be reserved. Recoverable: the craft
    /// stays `planned` and may be started again after restocking.
    #[error(
        "craft {craft_id}: insufficient stock of ingredient {item_id} at {location_id} (requested {requested}, available {available})"
    )]
    InsufficientStock {
        /// Craft being started.
        craft_id: CraftId,
        /// Failing ingredient.
        item_id: ItemId,
        /// Location the reservation targeted.
        location_id: LocationId,
        /// Amount requested.
        requested: Decimal,
        /// Amount available.
        available: Decimal,
    },

    /// A required ingredient has no source covering it.
    #[error("craft {craft_id}: ingredient {item_id} is unresolved (shortfall {shortfall})")]
    UnresolvedIngredient {
        /// Craft being started.
        craft_id: CraftId,
        /// Unresolved ingredient.
        item_id: ItemId,
        /// Quantity without a source.
        shortfall: Decimal,
    },

    /// The transition is not legal from the craft's current status.
    #[error("craft {craft_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Craft concerned.
        craft_id: CraftId,
        /// Current status.
        from: CraftStatus,
        /// Requested status.
        to: CraftStatus,
    },

    /// A ledger or record consistency check failed. Indicates a bug.
    #[error("craft {craft_id}: invariant violation: {detail}")]
    InvariantViolation {
        /// Craft concerned.
        craft_id: CraftId,
        /// What went wrong.
        detail: String,
    },

    /// Quantity arithmetic overflowed.
    #[error("craft {craft_id}: arithmetic overflow in {context}")]
    ArithmeticOverflow {
        /// Craft concerned.
        craft_id: CraftId,
        /// Operation that overflowed.
        context: &'static str,
    },
}

impl CraftError {
    /// Attach craft context to a ledger failure.
    pub fn from_ledger(craft_id: CraftId, err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientStock {
                item_id,
                location_id,
                requested,
                available,
            } => Self::InsufficientStock {
                craft_id,
                item_id,
                location_id,
                requested,
                available,
            },
            LedgerError::ArithmeticOverflow { context } => {
                Self::ArithmeticOverflow { craft_id, context }
            }
            other => {
                tracing::error!(%craft_id, error = %other, "ledger failure during craft transition");
                Self::InvariantViolation {
                    craft_id,
                    detail: other.to_string(),
                }
            }
        }
    }

    /// Whether the caller may retry after changing inputs (restocking).
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock { .. } | Self::UnresolvedIngredient { .. }
        )
    }
}

/// Errors returned by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A craft transition failed.
    #[error(transparent)]
    Craft(#[from] CraftError),

    /// A direct ledger operation (manual adjustment) failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A location write was rejected.
    #[error(transparent)]
    Location(#[from] LocationError),

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (e.g. `"craft"`).
        entity: &'static str,
        /// Requested identifier.
        id: Uuid,
    },

    /// The operation conflicts with existing data.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requester may not use the entity.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The persistence backend failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Shorthand for [`StoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<Uuid>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
