//! Crafting engine for SCIMS: ingredient resolution, the craft lifecycle,
//! gap analysis, craft suggestions and periodic aggregation.
//!
//! The engine logic is synchronous and pure over a [`StockLedger`] working
//! set. Persistence sits behind the [`ScimsStore`] trait; this crate ships
//! the in-memory implementation and `scims-db` provides `PostgreSQL`.
//!
//! # Modules
//!
//! - [`location`] -- Location arena, cycle checks and access scope.
//! - [`resolver`] -- Stock-first, source-second ingredient planning.
//! - [`craft`] -- `planned -> in_progress -> completed | cancelled`.
//! - [`gap`] -- Per-ingredient shortfall and candidate sources.
//! - [`optimizer`] -- Blueprint ranking for a target item.
//! - [`aggregator`] -- Ready-craft completion passes and usage stats.
//! - [`catalog`] -- Catalog validation and source reliability updates.
//! - [`store`] -- The [`ScimsStore`] contract.
//! - [`memory`] -- [`MemoryStore`].
//! - [`config`] -- `scims-config.yaml` loading.
//!
//! [`StockLedger`]: scims_ledger::StockLedger
//! [`ScimsStore`]: store::ScimsStore
//! [`MemoryStore`]: memory::MemoryStore

pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod craft;
pub mod error;
pub mod gap;
pub mod location;
pub mod memory;
pub mod optimizer;
pub mod resolver;
pub mod store;

pub use craft::{CompletionOutcome, CompletionReceipt, CraftRecord, NewCraft};
pub use error::{CraftError, StoreError};
pub use location::{LocationError, LocationGraph};
pub use memory::MemoryStore;
pub use store::{ReadyCraft, ScimsStore, StockAdjustment};
