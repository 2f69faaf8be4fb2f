//! Migration source port - where migration files come from

use crate::domain::result::Result;

/// Read-only view of an ordered set of migration files
pub trait MigrationSource {
    /// Filenames carrying the migration extension, sorted ascending
    fn list_files(&self) -> Result<Vec<String>>;

    /// Contents of `filename`, or `None` if it does not exist
    fn read(&self, filename: &str) -> Result<Option<String>>;

    /// Human-readable location, for messages
    fn describe(&self) -> String;
}
