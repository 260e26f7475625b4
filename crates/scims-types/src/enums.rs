//! Enumeration types for SCIMS entities.
//!
//! Every enum serializes as `snake_case` and has a stable string form via
//! `as_str` / [`FromStr`](core::str::FromStr). The string form is what the
//! `PostgreSQL` store writes into its `TEXT` columns.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    /// The enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl core::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown {} value: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// Implements `as_str`, [`Display`](core::fmt::Display) and
/// [`FromStr`](core::str::FromStr) for a fieldless enum.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stable `snake_case` name of the variant.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl core::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_owned(),
                    }),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Rarity tier of a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ItemRarity {
    /// Widely available.
    Common,
    /// Somewhat scarce.
    Uncommon,
    /// Scarce.
    Rare,
    /// Very scarce.
    Epic,
    /// Unique or near-unique.
    Legendary,
}

string_enum!(ItemRarity, "item rarity", {
    Common => "common",
    Uncommon => "uncommon",
    Rare => "rare",
    Epic => "epic",
    Legendary => "legendary",
});

/// Kind of storage container a location represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum LocationType {
    /// A space station or outpost.
    Station,
    /// A ship's cargo hold.
    Ship,
    /// A player's personal inventory.
    PlayerInventory,
    /// A dedicated warehouse.
    Warehouse,
}

string_enum!(LocationType, "location type", {
    Station => "station",
    Ship => "ship",
    PlayerInventory => "player_inventory",
    Warehouse => "warehouse",
});

/// Who owns a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum OwnerType {
    /// Owned by a single user.
    User,
    /// Owned by an organization.
    Organization,
    /// World-shared (canonical) location with no private owner.
    World,
}

string_enum!(OwnerType, "owner type", {
    User => "user",
    Organization => "organization",
    World => "world",
});

/// Whether a blueprint is visible to everyone or only to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Visibility {
    /// Visible to every requester.
    Public,
    /// Visible to the owner only.
    Private,
}

string_enum!(Visibility, "visibility", {
    Public => "public",
    Private => "private",
});

// ---------------------------------------------------------------------------
// Crafting
// ---------------------------------------------------------------------------

/// Lifecycle status of a craft.
///
/// ```text
/// planned --> in_progress --> completed
///    |             |
///    +-------------+--> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CraftStatus {
    /// Created, ingredients planned, nothing reserved.
    Planned,
    /// Stock reserved, waiting for the crafting time to elapse.
    InProgress,
    /// Ingredients consumed and output credited. Terminal.
    Completed,
    /// Abandoned; reservations returned. Terminal.
    Cancelled,
}

string_enum!(CraftStatus, "craft status", {
    Planned => "planned",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl CraftStatus {
    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Planned, Self::InProgress | Self::Cancelled)
                | (Self::InProgress, Self::Completed | Self::Cancelled)
        )
    }
}

/// Where a craft ingredient is obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SourceType {
    /// Ledger stock at an accessible location.
    Stock,
    /// Another player's stock (trade).
    Player,
    /// A universe location or trading post.
    Universe,
}

string_enum!(SourceType, "source type", {
    Stock => "stock",
    Player => "player",
    Universe => "universe",
});

/// Fulfillment status of a craft ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum FulfillmentStatus {
    /// Planned only; nothing earmarked.
    Pending,
    /// Stock earmarked in the ledger.
    Reserved,
    /// Stock deducted at craft completion.
    Fulfilled,
}

string_enum!(FulfillmentStatus, "fulfillment status", {
    Pending => "pending",
    Reserved => "reserved",
    Fulfilled => "fulfilled",
});

/// Kind of off-ledger resource source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ResourceSourceType {
    /// Stock held by another player.
    PlayerStock,
    /// A minable or harvestable universe location.
    UniverseLocation,
    /// A trading post selling the item.
    TradingPost,
}

string_enum!(ResourceSourceType, "resource source type", {
    PlayerStock => "player_stock",
    UniverseLocation => "universe_location",
    TradingPost => "trading_post",
});

impl ResourceSourceType {
    /// The craft ingredient source type this resource source maps to.
    pub const fn ingredient_source(self) -> SourceType {
        match self {
            Self::PlayerStock => SourceType::Player,
            Self::UniverseLocation | Self::TradingPost => SourceType::Universe,
        }
    }
}

/// Kind of stock ledger mutation recorded in the movement journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum MovementKind {
    /// Stock earmarked for a craft.
    Reserve,
    /// Earmark returned to availability.
    Release,
    /// Reserved stock deducted at craft completion.
    Consume,
    /// Craft output added to stock.
    Credit,
    /// Manual stock correction.
    Adjust,
}

string_enum!(MovementKind, "movement kind", {
    Reserve => "reserve",
    Release => "release",
    Consume => "consume",
    Credit => "credit",
    Adjust => "adjust",
});
