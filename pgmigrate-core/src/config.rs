//! Configuration management
//!
//! Project settings live in `pgmigrate.json` next to the migrations:
//! ```json
//! {
//!   "migrationsDir": "migrations",
//!   "ledgerTable": "schema_migrations",
//!   "databaseUrl": "postgres://localhost/locations",
//!   "advisoryLock": true,
//!   "extension": "sql"
//! }
//! ```
//! Every field is optional. A `.env` file in the project directory is loaded
//! first, and environment variables override the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::adapters::directory::{DirectorySource, DEFAULT_EXTENSION};
use crate::domain::result::{Error, Result};
use crate::domain::LedgerTable;
use crate::services::ledger::Ledger;

/// Name of the project settings file
pub const CONFIG_FILE: &str = "pgmigrate.json";

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_MIGRATIONS_DIR: &str = "PGMIGRATE_MIGRATIONS_DIR";
pub const ENV_LEDGER_TABLE: &str = "PGMIGRATE_LEDGER_TABLE";
pub const ENV_ADVISORY_LOCK: &str = "PGMIGRATE_ADVISORY_LOCK";

/// Raw pgmigrate.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    migrations_dir: Option<String>,
    #[serde(default)]
    ledger_table: Option<String>,
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    advisory_lock: Option<bool>,
    #[serde(default)]
    extension: Option<String>,
}

/// Resolved project configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    /// Configured directory resolved against `project_dir`
    pub migrations_dir: PathBuf,
    pub ledger_table: LedgerTable,
    pub database_url: Option<String>,
    pub advisory_lock: bool,
    pub extension: String,
}

impl Config {
    /// Load config for `project_dir` from `.env`, pgmigrate.json and the
    /// process environment
    pub fn load(project_dir: &Path) -> Result<Self> {
        let env_file = project_dir.join(".env");
        if env_file.is_file() {
            // Existing variables win over .env entries
            dotenvy::from_path(&env_file)
                .map_err(|e| Error::config(format!("{}: {}", env_file.display(), e)))?;
        }
        Self::load_with(project_dir, |key| std::env::var(key).ok())
    }

    /// Load config using `env` as the environment
    pub fn load_with(project_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let settings_path = project_dir.join(CONFIG_FILE);
        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::config(format!("{}: {}", settings_path.display(), e)))?
        } else {
            SettingsFile::default()
        };

        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let migrations_dir = var(ENV_MIGRATIONS_DIR)
            .or(raw.migrations_dir)
            .unwrap_or_else(|| "migrations".to_string());

        let ledger_table = match var(ENV_LEDGER_TABLE).or(raw.ledger_table) {
            Some(name) => LedgerTable::new(&name)?,
            None => LedgerTable::default(),
        };

        let advisory_lock = match var(ENV_ADVISORY_LOCK) {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                Error::config(format!("{} must be true or false, got '{}'", ENV_ADVISORY_LOCK, value))
            })?,
            None => raw.advisory_lock.unwrap_or(true),
        };

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            migrations_dir: project_dir.join(migrations_dir),
            ledger_table,
            database_url: var(ENV_DATABASE_URL).or(raw.database_url),
            advisory_lock,
            extension: raw.extension.unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
        })
    }

    /// Database URL, or an error naming how to set one
    pub fn database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            Error::config(format!(
                "no database configured; set {} or databaseUrl in {}",
                ENV_DATABASE_URL, CONFIG_FILE
            ))
        })
    }

    /// Migration files for this project
    pub fn source(&self) -> DirectorySource {
        DirectorySource::with_extension(&self.migrations_dir, &self.extension)
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(self.ledger_table.clone())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
