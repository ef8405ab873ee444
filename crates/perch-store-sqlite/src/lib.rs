//! SQLite backend for the Perch analytics store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Opening a store first
//! converges the database to the target schema — see [`converge`] for the
//! engine and its idempotence contract.

pub mod converge;
mod encode;
pub mod introspect;
mod store;

pub mod error;

pub use converge::ConvergeReport;
pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
