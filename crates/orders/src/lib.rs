//! Order placement.
//!
//! [`OrderCreationService`] turns a validated request into a persisted order
//! in one transaction, reserving stock through the [`InventoryLedger`].
//! [`Catalog`] resolves client lines into priced snapshots.

pub mod catalog;
pub mod error;
pub mod ledger;
pub mod service;

pub use catalog::{Catalog, DEFAULT_CATALOG_TTL};
pub use error::OrderError;
pub use ledger::InventoryLedger;
pub use service::{CreateOrderRequest, OrderCreationService, PlacedOrder};
