//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every entity has a strongly-typed ID so an item identifier can never be
//! passed where a location identifier is expected. All IDs use UUID v7
//! (time-ordered) for efficient index locality in `PostgreSQL`.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl core::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

define_id! {
    /// Unique identifier for a catalog item.
    ItemId
}

define_id! {
    /// Unique identifier for a storage location (station, ship, warehouse...).
    LocationId
}

define_id! {
    /// Unique identifier for a crafting blueprint (recipe).
    BlueprintId
}

define_id! {
    /// Unique identifier for one execution of a blueprint.
    CraftId
}

define_id! {
    /// Unique identifier for a per-craft ingredient requirement.
    CraftIngredientId
}

define_id! {
    /// Unique identifier for an off-ledger resource source.
    ResourceSourceId
}

define_id! {
    /// Unique identifier for an authenticated user (requester, owner).
    UserId
}

define_id! {
    /// Unique identifier for an organization a craft may belong to.
    OrganizationId
}

define_id! {
    /// Unique identifier for a stock movement journal entry.
    StockMovementId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let item = ItemId::new();
        let location = LocationId::new();
        assert_ne!(item.into_inner(), Uuid::nil());
        assert_ne!(location.into_inner(), Uuid::nil());
    }

    #[test]
    fn ids_serialize_as_bare_uuid_strings() {
        let id = CraftId::new();
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json, Some(format!("\"{}\"", id.into_inner())));
    }

    #[test]
    fn ids_parse_from_text() {
        let id = UserId::new();
        let parsed = format!(" {id} ").parse::<UserId>().ok();
        assert_eq!(parsed, Some(id));
        assert!("warehouse-7".parse::<LocationId>().is_err());
    }

    #[test]
    fn ids_order_by_creation_time() {
        let first = BlueprintId::new();
        let second = BlueprintId::new();
        assert!(first <= second);
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = ItemId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
