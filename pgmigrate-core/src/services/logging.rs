//! Logging service - structured event logging to DuckDB
//!
//! Records what pgmigrate did (commands, versions applied or reversed,
//! failures) in logs.duckdb under the pgmigrate home directory. Database URLs
//! and SQL text are never logged.
//!
//! The log schema is itself migrated with [`MigrationRunner`], using the
//! embedded files in `log_migrations`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::adapters::duckdb::DuckDbDatabase;
use crate::adapters::embedded::EmbeddedSource;
use crate::domain::LedgerTable;
use crate::log_migrations::{LOG_LEDGER_TABLE, LOG_MIGRATIONS};
use crate::services::ledger::Ledger;
use crate::services::runner::MigrationRunner;

/// File name of the event log inside the pgmigrate home directory
pub const LOG_DB_FILE: &str = "logs.duckdb";

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    // Lower 16 bits hold the counter (65536 unique IDs per millisecond)
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    ((now_ms() as u64) << 16) | counter
}

/// Current unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// A log event to be recorded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEvent {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Database backend the command ran against ("postgres", "duckdb")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

impl LogEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            ..Default::default()
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Attach the migration this event concerns
    pub fn with_migration(mut self, version: impl Into<String>, filename: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self.filename = Some(filename.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_error_details(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }
}

/// A log entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: i64,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub command: Option<String>,
    pub version: Option<String>,
    pub filename: Option<String>,
    pub target: Option<String>,
    pub error_message: Option<String>,
    pub error_details: Option<String>,
}

/// Per-event totals returned by [`LoggingService::stats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventCount {
    pub event: String,
    pub count: u64,
}

const ENTRY_COLUMNS: &str = "id, timestamp, app_version, platform, event, command, \
                             version, filename, target, error_message, error_details";

fn entry_from_row(row: &duckdb::Row<'_>) -> duckdb::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        app_version: row.get(2)?,
        platform: row.get(3)?,
        event: row.get(4)?,
        command: row.get(5)?,
        version: row.get(6)?,
        filename: row.get(7)?,
        target: row.get(8)?,
        error_message: row.get(9)?,
        error_details: row.get(10)?,
    })
}

/// Service for structured event logging
pub struct LoggingService {
    db: Mutex<DuckDbDatabase>,
    db_path: PathBuf,
    app_version: String,
    platform: &'static str,
}

impl LoggingService {
    /// Open or create logs.duckdb in `home_dir` and bring its schema up to date
    pub fn new(home_dir: &Path, app_version: impl Into<String>) -> Result<Self> {
        std::fs::create_dir_all(home_dir)?;
        let db_path = home_dir.join(LOG_DB_FILE);
        let db = DuckDbDatabase::open(&db_path)?;

        let service = Self {
            db: Mutex::new(db),
            db_path,
            app_version: app_version.into(),
            platform: detect_platform(),
        };
        service.run_migrations()?;
        Ok(service)
    }

    fn run_migrations(&self) -> Result<()> {
        let mut db = self.db.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let source = EmbeddedSource::new(LOG_MIGRATIONS);
        let ledger = Ledger::new(LedgerTable::new(LOG_LEDGER_TABLE)?);
        MigrationRunner::new(&mut *db, &source)
            .with_ledger(ledger)
            .migrate(None)?;
        Ok(())
    }

    /// Record an event; app version and platform are filled in automatically
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let db = self.db.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        db.connection().execute(
            &format!(
                "INSERT INTO sys_logs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                ENTRY_COLUMNS
            ),
            duckdb::params![
                generate_id(),
                now_ms(),
                &self.app_version,
                self.platform,
                &event.event,
                &event.command,
                &event.version,
                &event.filename,
                &event.target,
                &event.error_message,
                &event.error_details,
            ],
        )?;

        Ok(())
    }

    /// Log a CLI command execution
    pub fn log_command(&self, command: &str) -> Result<()> {
        self.log(LogEvent::new("command_executed").with_command(command))
    }

    /// Log a CLI command that ended in an error
    pub fn log_command_failed(&self, command: &str, message: &str, details: &str) -> Result<()> {
        self.log(
            LogEvent::new("command_failed")
                .with_command(command)
                .with_error(message)
                .with_error_details(details),
        )
    }

    /// Most recent entries, newest first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query_entries("", limit)
    }

    /// Most recent entries carrying an error, newest first
    pub fn get_errors(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query_entries("WHERE error_message IS NOT NULL", limit)
    }

    fn query_entries(&self, filter: &str, limit: usize) -> Result<Vec<LogEntry>> {
        let db = self.db.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let mut stmt = db.connection().prepare(&format!(
            "SELECT {} FROM sys_logs {} ORDER BY timestamp DESC, id DESC LIMIT ?",
            ENTRY_COLUMNS, filter
        ))?;
        let entries = stmt
            .query_map([limit as i64], entry_from_row)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    /// Entry counts grouped by event name, most frequent first
    pub fn stats(&self) -> Result<Vec<EventCount>> {
        let db = self.db.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let mut stmt = db.connection().prepare(
            "SELECT event, COUNT(*) FROM sys_logs GROUP BY event ORDER BY COUNT(*) DESC, event",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok(EventCount {
                    event: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(counts)
    }

    /// Total number of log entries
    pub fn count(&self) -> Result<u64> {
        let db = self.db.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let count: u64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM sys_logs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete logs older than the given unix timestamp (ms)
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let db = self.db.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let deleted = db
            .connection()
            .execute("DELETE FROM sys_logs WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_logging_service_creation() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), "1.0.0").unwrap();
        assert!(service.db_path().exists());
        assert_eq!(service.count().unwrap(), 0);
    }

    #[test]
    fn test_reopen_keeps_schema_and_entries() {
        let dir = tempdir().unwrap();
        {
            let service = LoggingService::new(dir.path(), "1.0.0").unwrap();
            service.log_command("up").unwrap();
        }
        let service = LoggingService::new(dir.path(), "1.0.1").unwrap();
        assert_eq!(service.count().unwrap(), 1);
    }

    #[test]
    fn test_log_with_migration_context() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), "1.0.0").unwrap();

        service
            .log(
                LogEvent::new("migration_applied")
                    .with_command("up")
                    .with_migration("002", "002_add_locations_index.sql")
                    .with_target("postgres"),
            )
            .unwrap();

        let entries = service.get_recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "migration_applied");
        assert_eq!(entries[0].version.as_deref(), Some("002"));
        assert_eq!(entries[0].filename.as_deref(), Some("002_add_locations_index.sql"));
        assert_eq!(entries[0].target.as_deref(), Some("postgres"));
        assert_eq!(entries[0].app_version, "1.0.0");
    }

    #[test]
    fn test_log_command_failed() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), "1.0.0").unwrap();

        service.log_command("up").unwrap();
        service
            .log_command_failed("up", "Migration 003_x.sql failed", "syntax error at or near \"CREAT\"")
            .unwrap();

        let errors = service.get_errors(10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].event, "command_failed");
        assert_eq!(errors[0].command.as_deref(), Some("up"));
        assert_eq!(errors[0].error_message.as_deref(), Some("Migration 003_x.sql failed"));
        assert!(errors[0].error_details.as_deref().unwrap().contains("CREAT"));
    }

    #[test]
    fn test_stats_count_and_delete() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), "1.0.0").unwrap();

        service.log_command("up").unwrap();
        service.log_command("down").unwrap();
        service.log(LogEvent::new("migration_applied")).unwrap();

        let stats = service.stats().unwrap();
        assert_eq!(
            stats[0],
            EventCount {
                event: "command_executed".to_string(),
                count: 2
            }
        );
        assert_eq!(service.count().unwrap(), 3);

        let deleted = service.delete_before(now_ms() + 1000).unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(service.count().unwrap(), 0);
    }
}
