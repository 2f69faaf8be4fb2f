//! pgmigrate Core - versioned SQL migrations for Postgres
//!
//! This crate implements the migration engine following hexagonal architecture:
//!
//! - **domain**: Versions, migration files, ledger entries and errors
//! - **ports**: Trait definitions for the database and migration sources
//! - **services**: Store, ledger, runner, authoring, doctor and event log
//! - **adapters**: Concrete implementations (Postgres, DuckDB, directories)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod ports;
pub mod services;

use std::path::Path;

use adapters::directory::DirectorySource;
use config::Config;
use domain::result::Result;
use ports::Database;
use services::MigrationRunner;

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{Direction, LedgerEntry, MigrationFile, Version};
pub use services::{
    LogEntry, LogEvent, LoggingService, MigrateResult, RollbackResult, RunEvent, StatusReport,
};

/// Main context for migration commands
///
/// Holds the resolved configuration, the migration directory and an open
/// database connection.
pub struct MigrateContext {
    pub config: Config,
    pub source: DirectorySource,
    pub db: Box<dyn Database>,
}

impl MigrateContext {
    /// Load configuration for `project_dir` and connect to its database
    pub fn open(project_dir: &Path) -> Result<Self> {
        Self::connect(Config::load(project_dir)?)
    }

    pub fn connect(config: Config) -> Result<Self> {
        let db = adapters::connect(config.database_url()?)?;
        Ok(Self {
            source: config.source(),
            config,
            db,
        })
    }

    /// Runner over this project's database, ledger and lock settings
    pub fn runner(&mut self) -> MigrationRunner<'_> {
        MigrationRunner::new(self.db.as_mut(), &self.source)
            .with_ledger(self.config.ledger())
            .with_lock(self.config.advisory_lock)
    }
}
