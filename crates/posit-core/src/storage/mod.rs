//! Storage layer
//!
//! Owns the SQLite engine handle, the schema, and the error types shared by
//! every store.
//!
//! ## Architecture
//!
//! - **Database**: one connection behind a mutex, cloned into each store
//! - **Schema**: `finds`, `find_attributes`, `attachments`
//!
//! Id allocation is left to SQLite (`AUTOINCREMENT`).

pub mod database;
pub mod error;
pub mod schema;

pub use database::Database;
pub use error::{StoreError, StoreResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
