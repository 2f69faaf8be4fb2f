//! CLI command implementations

pub mod check;
pub mod create;
pub mod down;
pub mod logs;
pub mod mark;
pub mod status;
pub mod up;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use pgmigrate_core::config::Config;
use pgmigrate_core::ports::Database;
use pgmigrate_core::{LogEvent, LoggingService, MigrateContext, RunEvent};

use crate::output;

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let home = get_home_dir().ok()?;
    LoggingService::new(&home, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the pgmigrate home directory from environment or default
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("PGMIGRATE_HOME") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".pgmigrate"))
        .ok_or_else(|| anyhow!("Could not find home directory; set PGMIGRATE_HOME"))
}

/// Resolve the project directory (flag or PGMIGRATE_PROJECT_DIR, else cwd)
pub fn project_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("Failed to read current directory"),
    }
}

pub fn load_config(project_dir: &Path) -> Result<Config> {
    Config::load(project_dir)
        .with_context(|| format!("Failed to load configuration from {}", project_dir.display()))
}

/// Load configuration and connect to the project's database
pub fn get_context(project_dir: &Path) -> Result<MigrateContext> {
    let config = load_config(project_dir)?;
    let url = config.database_url()?.to_string();
    MigrateContext::connect(config).with_context(|| {
        format!(
            "Failed to connect to {}",
            pgmigrate_core::adapters::redact(&url)
        )
    })
}

/// Backend name recorded with log events
pub fn target_name(db: &dyn Database) -> &'static str {
    db.dialect().name()
}

/// Print progress for a runner event and record it in the event log
pub fn report_event(
    logger: &Option<LoggingService>,
    command: &str,
    target: &str,
    event: &RunEvent,
    quiet: bool,
) {
    let log = |name: &str, version: &str, filename: &str| {
        log_event(
            logger,
            LogEvent::new(name)
                .with_command(command)
                .with_migration(version, filename)
                .with_target(target),
        );
    };

    match event {
        RunEvent::Applying { filename, .. } if !quiet => {
            output::info(&format!("Applying {}...", filename));
        }
        RunEvent::RollingBack { filename, .. } if !quiet => {
            output::info(&format!("Rolling back {}...", filename));
        }
        RunEvent::Applied { version, filename } => {
            if !quiet {
                output::success(&format!("✓ Applied {}", filename));
            }
            log("migration_applied", version, filename);
        }
        RunEvent::RolledBack { version, filename } => {
            if !quiet {
                output::success(&format!("✓ Rolled back {}", filename));
            }
            log("migration_rolled_back", version, filename);
        }
        RunEvent::Skipped { version, reason } => {
            if !quiet {
                output::warning(&format!("⚠ Skipping {}: {}", version, reason));
            }
            log_event(
                logger,
                LogEvent::new("rollback_skipped")
                    .with_command(command)
                    .with_version(version)
                    .with_target(target)
                    .with_error_details(reason),
            );
        }
        RunEvent::Marked { version, filename } => {
            log("migration_marked", version, filename);
        }
        _ => {}
    }
}
