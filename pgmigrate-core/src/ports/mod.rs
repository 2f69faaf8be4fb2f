//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The services
//! depend only on these traits, not on concrete implementations.

mod database;
mod source;

pub use database::{in_transaction, Database, Dialect};
pub use source::MigrationSource;
