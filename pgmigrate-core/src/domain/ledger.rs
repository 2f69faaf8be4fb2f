//! Applied-version ledger domain model

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// One row of the ledger table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub version: String,
    pub applied_at: Option<NaiveDateTime>,
}

/// Validated ledger table name (`table` or `schema.table`)
///
/// The name is interpolated into DDL, so only plain identifiers are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTable(String);

impl LedgerTable {
    pub const DEFAULT: &'static str = "schema_migrations";

    pub fn new(name: &str) -> Result<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
            return Err(Error::config(format!("invalid ledger table name '{}'", name)));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Schema (when qualified) and bare table name
    pub fn parts(&self) -> (Option<&str>, &str) {
        match self.0.split_once('.') {
            Some((schema, table)) => (Some(schema), table),
            None => (None, &self.0),
        }
    }
}

impl Default for LedgerTable {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for LedgerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_table_names() {
        assert!(LedgerTable::new("schema_migrations").is_ok());
        assert!(LedgerTable::new("ops.schema_migrations").is_ok());
        assert!(LedgerTable::new("_m1").is_ok());

        assert!(LedgerTable::new("").is_err());
        assert!(LedgerTable::new("1table").is_err());
        assert!(LedgerTable::new("a.b.c").is_err());
        assert!(LedgerTable::new("t; DROP TABLE users").is_err());
    }

    #[test]
    fn test_parts() {
        let qualified = LedgerTable::new("ops.applied").unwrap();
        assert_eq!(qualified.parts(), (Some("ops"), "applied"));
        assert_eq!(LedgerTable::default().parts(), (None, "schema_migrations"));
    }

    #[test]
    fn test_default_table() {
        assert_eq!(LedgerTable::default().as_str(), "schema_migrations");
    }
}
