//! Core types and trait definitions for the Perch analytics store.
//!
//! This crate is deliberately free of database dependencies. It defines the
//! declarative schema model consumed by the convergence engine, the concrete
//! target schema of the SEO platform, and the domain row types the
//! application layer reads and writes.

pub mod analysis;
pub mod client;
pub mod domain;
pub mod error;
pub mod keyword;
pub mod schema;
pub mod store;
pub mod target;

pub use error::{Error, Result};
