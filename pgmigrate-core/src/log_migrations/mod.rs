//! Event log schema - embedded migration files
//!
//! Applied to logs.duckdb by the same runner that migrates user databases,
//! so the files use the `-- +migrate Up` / `-- +migrate Down` layout.

/// All event log migrations, embedded at compile time.
/// Format: (filename, sql_content)
///
/// When adding a migration, create `NNN_description.sql` and list it here.
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[("001_event_log.sql", include_str!("001_event_log.sql"))];

/// Ledger table used inside logs.duckdb
pub const LOG_LEDGER_TABLE: &str = "sys_migrations";
