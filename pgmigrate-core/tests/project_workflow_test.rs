//! End-to-end project workflow: config, authoring, migrate, check, event log
//!
//! Run with: cargo test --test project_workflow_test -- --nocapture

use std::fs;

use tempfile::TempDir;

use pgmigrate_core::config::{Config, CONFIG_FILE};
use pgmigrate_core::ports::Dialect;
use pgmigrate_core::services::{create_migration, CheckStatus, DoctorService, LogEvent, LoggingService};
use pgmigrate_core::{MigrateContext, RunEvent};

fn project_config(temp: &TempDir) -> Config {
    let db_path = temp.path().join("dev.duckdb");
    fs::write(
        temp.path().join(CONFIG_FILE),
        format!(
            r#"{{"databaseUrl": "duckdb:{}", "ledgerTable": "schema_migrations"}}"#,
            db_path.display()
        ),
    )
    .unwrap();
    Config::load_with(temp.path(), |_| None).unwrap()
}

/// Replace the template body of a freshly created migration
fn fill(path: &std::path::Path, up: &str, down: &str) {
    fs::write(path, format!("-- +migrate Up\n{}\n\n-- +migrate Down\n{}\n", up, down)).unwrap();
}

#[test]
fn test_create_migrate_and_roll_back() {
    let temp = TempDir::new().unwrap();
    let config = project_config(&temp);

    let first = create_migration(&config.source(), "Create businesses").unwrap();
    fill(
        &first,
        "CREATE TABLE businesses (id INTEGER PRIMARY KEY, name VARCHAR NOT NULL);",
        "DROP TABLE businesses;",
    );
    let second = create_migration(&config.source(), "add address columns").unwrap();
    fill(
        &second,
        "ALTER TABLE businesses ADD COLUMN address VARCHAR;",
        "ALTER TABLE businesses DROP COLUMN address;",
    );
    assert_eq!(second.file_name().unwrap(), "002_add_address_columns.sql");

    let mut ctx = MigrateContext::connect(config).unwrap();
    let result = ctx.runner().migrate(None).unwrap();
    assert_eq!(result.applied.len(), 2);

    let status = ctx.runner().status().unwrap();
    assert_eq!(status.applied.len(), 2);
    assert!(status.pending.is_empty());

    let result = ctx.runner().rollback(1).unwrap();
    assert_eq!(result.rolled_back[0].filename, "002_add_address_columns.sql");
    assert_eq!(ctx.runner().status().unwrap().pending.len(), 1);
}

#[test]
fn test_check_flags_orphaned_versions() {
    let temp = TempDir::new().unwrap();
    let config = project_config(&temp);
    let path = create_migration(&config.source(), "create categories").unwrap();
    fill(&path, "CREATE TABLE categories (id INTEGER);", "DROP TABLE categories;");

    let mut ctx = MigrateContext::connect(config.clone()).unwrap();
    ctx.runner().migrate(None).unwrap();
    fs::remove_file(&path).unwrap();

    let source = config.source();
    let doctor = DoctorService::new(&source, Dialect::DuckDb);
    let result = doctor
        .run_checks(Some(ctx.db.as_mut()), &config.ledger())
        .unwrap();

    assert_eq!(result.checks["orphaned_ledger"].status, CheckStatus::Warning);
    assert!(result.is_healthy());
}

#[test]
fn test_event_log_records_runner_events() {
    let temp = TempDir::new().unwrap();
    let home = temp.path().join("home");
    let config = project_config(&temp);
    let path = create_migration(&config.source(), "create categories").unwrap();
    fill(&path, "CREATE TABLE categories (id INTEGER);", "DROP TABLE categories;");

    // One instance for the whole command, as the CLI holds it
    {
        let logger = LoggingService::new(&home, "test").unwrap();
        logger.log_command("up").unwrap();

        let mut ctx = MigrateContext::connect(config).unwrap();
        ctx.runner()
            .with_observer(|event| {
                if let RunEvent::Applied { version, filename } = event {
                    logger
                        .log(
                            LogEvent::new("migration_applied")
                                .with_command("up")
                                .with_migration(version.as_str(), filename.as_str()),
                        )
                        .unwrap();
                }
            })
            .migrate(None)
            .unwrap();

        logger
            .log_command_failed("up", "Migration 002_x.sql failed", "syntax error")
            .unwrap();
        assert_eq!(logger.count().unwrap(), 3);
    }
    assert!(home.join("logs.duckdb").exists());

    let reopened = LoggingService::new(&home, "test").unwrap();
    let mut events: Vec<String> = reopened
        .get_recent(10)
        .unwrap()
        .into_iter()
        .map(|e| e.event)
        .collect();
    events.sort();
    assert_eq!(events, vec!["command_executed", "command_failed", "migration_applied"]);

    let applied = reopened
        .get_recent(10)
        .unwrap()
        .into_iter()
        .find(|e| e.event == "migration_applied")
        .unwrap();
    assert_eq!(applied.filename.as_deref(), Some("001_create_categories.sql"));
    assert_eq!(reopened.get_errors(10).unwrap().len(), 1);
}
