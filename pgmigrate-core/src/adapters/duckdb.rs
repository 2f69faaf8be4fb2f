//! DuckDB database implementation
//!
//! Embedded backend used for local development, the event log and tests.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use duckdb::{params_from_iter, Connection};
use fs2::FileExt;

use crate::domain::result::{Error, Result};
use crate::ports::{Database, Dialect};

/// Maximum number of retries when the database or lock file is busy
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock")
        || lower.contains("file is already open")
}

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt))
}

/// DuckDB-backed [`Database`]
pub struct DuckDbDatabase {
    conn: Connection,
    db_path: Option<PathBuf>,
    lock_path: Option<PathBuf>,
    lock_file: Option<File>,
}

impl DuckDbDatabase {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff while another process holds the file.
    pub fn open(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn,
                        db_path: Some(db_path.to_path_buf()),
                        lock_path: Some(default_lock_path(db_path)),
                        lock_file: None,
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay = retry_delay(attempt);
                        eprintln!(
                            "[pgmigrate] Database busy, retrying in {}ms (attempt {}/{}): {}",
                            delay.as_millis(),
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(Error::Connectivity(err_msg));
                }
            }
        }

        Err(Error::Connectivity(last_error.map(|e| e.to_string()).unwrap_or_else(|| {
            format!("failed to open database after {} retries", MAX_RETRIES)
        })))
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        // Disable extension autoloading to avoid macOS code signing issues
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)
            .map_err(|e| Error::Connectivity(e.to_string()))?;
        Ok(Self {
            conn,
            db_path: None,
            lock_path: None,
            lock_file: None,
        })
    }

    /// Use `path` as the migration lock file instead of `<db>.lock`
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    fn try_open_connection(db_path: &Path) -> std::result::Result<Connection, duckdb::Error> {
        // IMPORTANT: Disable extension autoloading to avoid macOS code signing issues
        // (cached extensions in ~/.duckdb/extensions may have different Team IDs)
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    /// Underlying connection, for typed queries outside the [`Database`] port
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path of the database file (`None` for in-memory databases)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if a table exists in the main schema
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let (schema, table) = table_name.split_once('.').unwrap_or(("main", table_name));
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables
             WHERE table_schema = ? AND table_name = ?",
            [schema, table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn default_lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

impl Database for DuckDbDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    fn batch_execute(&mut self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[&str]) -> Result<u64> {
        let affected = self.conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(affected as u64)
    }

    fn query_rows(
        &mut self,
        sql: &str,
        params: &[&str],
        columns: usize,
    ) -> Result<Vec<Vec<Option<String>>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                (0..columns)
                    .map(|idx| row.get::<_, Option<String>>(idx))
                    .collect::<std::result::Result<Vec<_>, _>>()
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn begin(&mut self) -> Result<()> {
        self.batch_execute("BEGIN TRANSACTION")
    }

    /// Exclusive lock on the lock file; in-memory databases without a lock
    /// file are private to this process and need none
    fn lock(&mut self, _key: i64) -> Result<()> {
        let Some(path) = self.lock_path.clone() else {
            return Ok(());
        };
        if self.lock_file.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        for attempt in 0..MAX_RETRIES {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    self.lock_file = Some(file);
                    return Ok(());
                }
                Err(_) if attempt < MAX_RETRIES - 1 => thread::sleep(retry_delay(attempt)),
                Err(e) => {
                    return Err(Error::Lock(format!(
                        "{} is held by another process: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Err(Error::Lock(format!("{} is held by another process", path.display())))
    }

    fn unlock(&mut self, _key: i64) -> Result<()> {
        if let Some(file) = self.lock_file.take() {
            file.unlock()?;
        }
        Ok(())
    }
}
