//! Core domain entities
//!
//! Migration files, versions and ledger rows. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod ledger;
mod migration;
pub mod result;

pub use ledger::{LedgerEntry, LedgerTable};
pub use migration::{parse_sections, Direction, MigrationFile, Sections, Version, DOWN_MARKER, UP_MARKER};
