//! Data layer for SCIMS: `PostgreSQL` persistence and the `Dragonfly` stats
//! cache.
//!
//! ```text
//! API / scheduler
//!     |
//!     +-- ScimsStore --> PgStore --> PostgreSQL
//!     |                    |-- catalog_store  (items, locations, blueprints, sources)
//!     |                    |-- stock_store    (item_stock, stock_movements)
//!     |                    +-- craft_store    (crafts, ingredients, allocations)
//!     |
//!     +-- usage stats ---> DragonflyPool (stats:usage, TTL)
//! ```
//!
//! # Modules
//!
//! - [`pg_store`] -- [`PgStore`], the transactional [`ScimsStore`](scims_core::ScimsStore)
//! - [`postgres`] -- `PostgreSQL` pool and migrations
//! - [`catalog_store`] -- Catalog queries
//! - [`stock_store`] -- Stock rows and the movement journal
//! - [`craft_store`] -- Craft rows and readiness/statistics queries
//! - [`rows`] -- Row types and decoding
//! - [`dragonfly`] -- `Dragonfly` stats cache
//! - [`error`] -- Shared error types

pub mod catalog_store;
pub mod craft_store;
pub mod dragonfly;
pub mod error;
pub mod pg_store;
pub mod postgres;
pub mod rows;
pub mod stock_store;

pub use dragonfly::{DragonflyPool, USAGE_STATS_KEY};
pub use error::DbError;
pub use pg_store::PgStore;
pub use postgres::PostgresPool;
