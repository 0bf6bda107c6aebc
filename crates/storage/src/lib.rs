//! Storage for the commerce core.
//!
//! Every workflow runs inside one [`Transaction`]: reads, row locks, and
//! writes are staged there and become visible together on
//! [`Transaction::commit`]. Dropping a transaction rolls it back and releases
//! its locks.

pub mod constraints;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{Store, Transaction};
