//! Ledger - durable record of applied migration versions
//!
//! Lives in the same database the migrations act on, so a ledger write can
//! share a transaction with the script it records.

use chrono::{NaiveDateTime, Utc};

use crate::domain::result::Result;
use crate::domain::{LedgerEntry, LedgerTable};
use crate::ports::{Database, Dialect};

/// Timestamp layout written to and read from `applied_at`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Ledger table operations
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    table: LedgerTable,
}

impl Ledger {
    pub fn new(table: LedgerTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &LedgerTable {
        &self.table
    }

    /// Create the ledger table if it does not exist; safe to repeat
    pub fn ensure_table(&self, db: &mut dyn Database) -> Result<()> {
        // DuckDB without ICU cannot default a TIMESTAMP to CURRENT_TIMESTAMP,
        // so applied_at is always written explicitly
        let applied_at = match db.dialect() {
            Dialect::Postgres => "TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
            Dialect::DuckDb => "TIMESTAMP",
        };
        db.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version VARCHAR(255) PRIMARY KEY,
                applied_at {}
            )",
            self.table, applied_at
        ))
    }

    /// Whether the ledger table exists; unqualified names are looked up in
    /// the connection's current schema
    pub fn exists(&self, db: &mut dyn Database) -> Result<bool> {
        let rows = match self.table.parts() {
            (Some(schema), table) => db.query_rows(
                "SELECT table_name FROM information_schema.tables
                 WHERE table_schema = $1 AND table_name = $2",
                &[schema, table],
                1,
            )?,
            (None, table) => db.query_rows(
                "SELECT table_name FROM information_schema.tables
                 WHERE table_schema = current_schema() AND table_name = $1",
                &[table],
                1,
            )?,
        };
        Ok(!rows.is_empty())
    }

    /// All ledger rows, ascending by version
    pub fn entries(&self, db: &mut dyn Database) -> Result<Vec<LedgerEntry>> {
        let rows = db.query_rows(
            &format!(
                "SELECT version, CAST(applied_at AS VARCHAR) FROM {} ORDER BY version",
                self.table
            ),
            &[],
            2,
        )?;

        Ok(rows
            .into_iter()
            .filter_map(|mut row| {
                let applied_at = row.pop().flatten();
                let version = row.pop().flatten()?;
                Some(LedgerEntry {
                    version,
                    applied_at: applied_at.as_deref().and_then(parse_timestamp),
                })
            })
            .collect())
    }

    /// Applied versions, ascending
    pub fn applied_versions(&self, db: &mut dyn Database) -> Result<Vec<String>> {
        Ok(self.entries(db)?.into_iter().map(|e| e.version).collect())
    }

    pub fn contains(&self, db: &mut dyn Database, version: &str) -> Result<bool> {
        let rows = db.query_rows(
            &format!("SELECT version FROM {} WHERE version = $1", self.table),
            &[version],
            1,
        )?;
        Ok(!rows.is_empty())
    }

    /// Record `version` as applied; an existing row is left untouched
    pub fn record_applied(&self, db: &mut dyn Database, version: &str) -> Result<()> {
        let now = Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string();
        db.execute(
            &format!(
                "INSERT INTO {} (version, applied_at) VALUES ($1, TIMESTAMP '{}')
                 ON CONFLICT (version) DO NOTHING",
                self.table, now
            ),
            &[version],
        )?;
        Ok(())
    }

    /// Remove `version` from the ledger; absent rows are not an error
    pub fn record_rolled_back(&self, db: &mut dyn Database, version: &str) -> Result<()> {
        db.execute(
            &format!("DELETE FROM {} WHERE version = $1", self.table),
            &[version],
        )?;
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbDatabase;

    fn setup() -> (DuckDbDatabase, Ledger) {
        let mut db = DuckDbDatabase::in_memory().unwrap();
        let ledger = Ledger::default();
        ledger.ensure_table(&mut db).unwrap();
        (db, ledger)
    }

    #[test]
    fn test_ensure_table_is_idempotent() {
        let (mut db, ledger) = setup();
        ledger.record_applied(&mut db, "001").unwrap();
        ledger.ensure_table(&mut db).unwrap();
        ledger.ensure_table(&mut db).unwrap();
        assert_eq!(ledger.applied_versions(&mut db).unwrap(), vec!["001"]);
    }

    #[test]
    fn test_record_applied_orders_and_ignores_duplicates() {
        let (mut db, ledger) = setup();
        ledger.record_applied(&mut db, "002").unwrap();
        ledger.record_applied(&mut db, "001").unwrap();
        ledger.record_applied(&mut db, "002").unwrap();

        let entries = ledger.entries(&mut db).unwrap();
        let versions: Vec<&str> = entries.iter().map(|e| e.version.as_str()).collect();
        assert_eq!(versions, vec!["001", "002"]);
        assert!(entries.iter().all(|e| e.applied_at.is_some()));
        assert!(ledger.contains(&mut db, "001").unwrap());
    }

    #[test]
    fn test_record_rolled_back_tolerates_absence() {
        let (mut db, ledger) = setup();
        ledger.record_applied(&mut db, "001").unwrap();
        ledger.record_rolled_back(&mut db, "001").unwrap();
        ledger.record_rolled_back(&mut db, "001").unwrap();
        assert!(!ledger.contains(&mut db, "001").unwrap());
        assert!(ledger.applied_versions(&mut db).unwrap().is_empty());
    }

    #[test]
    fn test_exists() {
        let mut db = DuckDbDatabase::in_memory().unwrap();
        let ledger = Ledger::default();
        assert!(!ledger.exists(&mut db).unwrap());
        ledger.ensure_table(&mut db).unwrap();
        assert!(ledger.exists(&mut db).unwrap());

        let qualified = Ledger::new(LedgerTable::new("ops.applied").unwrap());
        db.batch_execute("CREATE SCHEMA ops").unwrap();
        assert!(!qualified.exists(&mut db).unwrap());
        qualified.ensure_table(&mut db).unwrap();
        assert!(qualified.exists(&mut db).unwrap());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-03-01 10:15:30.123456").is_some());
        assert!(parse_timestamp("2024-03-01 10:15:30").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
