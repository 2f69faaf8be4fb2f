//! Database port - the SQL connection a runner drives
//!
//! Adapters own exactly one connection. The runner borrows it for the length
//! of a command; nothing is shared through globals.

use crate::domain::result::Result;

/// SQL dialect spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    DuckDb,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::DuckDb => "duckdb",
        }
    }
}

/// A single database connection
///
/// Parameters are positional text values bound as `$1`, `$2`, ...
pub trait Database {
    fn dialect(&self) -> Dialect;

    /// Run one or more `;`-separated statements, discarding results
    fn batch_execute(&mut self, sql: &str) -> Result<()>;

    /// Run one parameterized statement, returning affected rows
    fn execute(&mut self, sql: &str, params: &[&str]) -> Result<u64>;

    /// Run a query whose first `columns` columns are read as nullable text
    fn query_rows(
        &mut self,
        sql: &str,
        params: &[&str],
        columns: usize,
    ) -> Result<Vec<Vec<Option<String>>>>;

    fn begin(&mut self) -> Result<()> {
        self.batch_execute("BEGIN")
    }

    fn commit(&mut self) -> Result<()> {
        self.batch_execute("COMMIT")
    }

    fn rollback(&mut self) -> Result<()> {
        self.batch_execute("ROLLBACK")
    }

    /// Take the cross-process migration lock identified by `key`
    fn lock(&mut self, _key: i64) -> Result<()> {
        Ok(())
    }

    /// Release a lock taken with [`Database::lock`]
    fn unlock(&mut self, _key: i64) -> Result<()> {
        Ok(())
    }
}

/// Run `f` inside a transaction
///
/// Commits when `f` succeeds. On any error the transaction is rolled back and
/// the original error is returned; a failing ROLLBACK does not mask it.
pub fn in_transaction<T>(
    db: &mut dyn Database,
    f: impl FnOnce(&mut dyn Database) -> Result<T>,
) -> Result<T> {
    db.begin()?;
    match f(&mut *db) {
        Ok(value) => match db.commit() {
            Ok(()) => Ok(value),
            Err(e) => {
                let _ = db.rollback();
                Err(e)
            }
        },
        Err(e) => {
            let _ = db.rollback();
            Err(e)
        }
    }
}
