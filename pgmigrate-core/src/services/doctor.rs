//! Doctor service - read-only health checks over migrations and the ledger

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::json;
use sqlparser::dialect::{Dialect as SqlDialect, DuckDbDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use crate::domain::result::Result;
use crate::domain::{Direction, MigrationFile};
use crate::ports::{Database, Dialect, MigrationSource};
use crate::services::ledger::Ledger;
use crate::services::store::MigrationStore;

/// Outcome of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warning,
    Error,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<serde_json::Value>>,
}

impl CheckResult {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Pass,
            message: message.into(),
            details: None,
        }
    }

    fn failing(status: CheckStatus, message: impl Into<String>, details: Vec<serde_json::Value>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Some(details),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorResult {
    pub checks: BTreeMap<String, CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorResult {
    /// True when no check reported an error (warnings are allowed)
    pub fn is_healthy(&self) -> bool {
        self.summary.errors == 0
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorSummary {
    pub passed: i64,
    pub warnings: i64,
    pub errors: i64,
}

/// Doctor service for health checks
pub struct DoctorService<'a> {
    store: MigrationStore<'a>,
    dialect: Dialect,
}

impl<'a> DoctorService<'a> {
    pub fn new(source: &'a dyn MigrationSource, dialect: Dialect) -> Self {
        Self {
            store: MigrationStore::new(source),
            dialect,
        }
    }

    /// Run all checks; the ledger check is skipped when `db` is `None`
    pub fn run_checks(&self, db: Option<&mut dyn Database>, ledger: &Ledger) -> Result<DoctorResult> {
        let mut checks = BTreeMap::new();
        let survey = self.store.survey()?;

        // Filenames, versions and widths
        checks.insert(
            "filenames".to_string(),
            if survey.problems.is_empty() {
                CheckResult::pass(format!(
                    "{} migration file(s) in {}",
                    survey.migrations.len(),
                    self.store.describe()
                ))
            } else {
                CheckResult::failing(
                    CheckStatus::Error,
                    format!("{} problem(s) with migration files", survey.problems.len()),
                    survey.problems.iter().map(|p| json!({ "problem": p })).collect(),
                )
            },
        );

        let no_up = missing_section(&survey.migrations, Direction::Up);
        checks.insert(
            "up_sections".to_string(),
            if no_up.is_empty() {
                CheckResult::pass("Every migration has an up section")
            } else {
                CheckResult::failing(
                    CheckStatus::Error,
                    format!("{} migration(s) have no up section", no_up.len()),
                    no_up.iter().map(|f| json!({ "filename": f })).collect(),
                )
            },
        );

        let no_down = missing_section(&survey.migrations, Direction::Down);
        checks.insert(
            "down_sections".to_string(),
            if no_down.is_empty() {
                CheckResult::pass("Every migration can be rolled back")
            } else {
                CheckResult::failing(
                    CheckStatus::Warning,
                    format!("{} migration(s) cannot be rolled back", no_down.len()),
                    no_down.iter().map(|f| json!({ "filename": f })).collect(),
                )
            },
        );

        let syntax = self.syntax_errors(&survey.migrations);
        checks.insert(
            "sql_syntax".to_string(),
            if syntax.is_empty() {
                CheckResult::pass(format!("All sections parse as {} SQL", self.dialect.name()))
            } else {
                // The parser lags behind the servers, so this never blocks
                CheckResult::failing(
                    CheckStatus::Warning,
                    format!("{} section(s) did not parse", syntax.len()),
                    syntax,
                )
            },
        );

        let orphaned = match db {
            Some(db) => self.orphaned_check(db, ledger, &survey.migrations),
            None => CheckResult::pass("No database configured; ledger not checked"),
        };
        checks.insert("orphaned_ledger".to_string(), orphaned);

        let passed = checks.values().filter(|c| c.status == CheckStatus::Pass).count() as i64;
        let warnings = checks.values().filter(|c| c.status == CheckStatus::Warning).count() as i64;
        let errors = checks.values().filter(|c| c.status == CheckStatus::Error).count() as i64;

        Ok(DoctorResult {
            checks,
            summary: DoctorSummary { passed, warnings, errors },
        })
    }

    fn orphaned_check(
        &self,
        db: &mut dyn Database,
        ledger: &Ledger,
        migrations: &[MigrationFile],
    ) -> CheckResult {
        let entries = match ledger.exists(&mut *db) {
            Ok(false) => {
                return CheckResult::pass(format!("Ledger table {} does not exist yet", ledger.table()))
            }
            Ok(true) => ledger.entries(db),
            Err(e) => Err(e),
        };
        let entries = match entries {
            Ok(entries) => entries,
            Err(e) => {
                return CheckResult::failing(
                    CheckStatus::Error,
                    format!("Could not read ledger table {}", ledger.table()),
                    vec![json!({ "error": e.to_string() })],
                )
            }
        };

        let known: HashSet<&str> = migrations.iter().map(|m| m.version.as_str()).collect();
        let orphans: Vec<String> = entries
            .into_iter()
            .map(|e| e.version)
            .filter(|v| !known.contains(v.as_str()))
            .collect();
        if orphans.is_empty() {
            CheckResult::pass("Every applied version has a migration file")
        } else {
            CheckResult::failing(
                CheckStatus::Warning,
                format!("{} applied version(s) have no migration file", orphans.len()),
                orphans.iter().map(|v| json!({ "version": v })).collect(),
            )
        }
    }

    fn syntax_errors(&self, migrations: &[MigrationFile]) -> Vec<serde_json::Value> {
        let dialect: Box<dyn SqlDialect> = match self.dialect {
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
            Dialect::DuckDb => Box::new(DuckDbDialect {}),
        };

        let mut details = Vec::new();
        for migration in migrations {
            for (direction, label) in [(Direction::Up, "up"), (Direction::Down, "down")] {
                let Ok(sql) = migration.script(direction) else {
                    continue;
                };
                if let Err(e) = Parser::parse_sql(dialect.as_ref(), sql) {
                    details.push(json!({
                        "filename": migration.filename,
                        "section": label,
                        "error": e.to_string(),
                    }));
                }
            }
        }
        details
    }
}

fn missing_section(migrations: &[MigrationFile], direction: Direction) -> Vec<String> {
    migrations
        .iter()
        .filter(|m| m.script(direction).is_err())
        .map(|m| m.filename.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbDatabase;
    use crate::adapters::embedded::EmbeddedSource;

    static HEALTHY: &[(&str, &str)] = &[(
        "001_create_locations.sql",
        "-- +migrate Up\nCREATE TABLE locations (id INTEGER PRIMARY KEY, name TEXT);\n-- +migrate Down\nDROP TABLE locations;",
    )];

    static UNHEALTHY: &[(&str, &str)] = &[
        ("001_no_down.sql", "-- +migrate Up\nCREATE TABLE a (id INTEGER);"),
        ("002_no_up.sql", "-- +migrate Down\nDROP TABLE b;"),
        ("003_typo.sql", "-- +migrate Up\nCREAT TABLE c (id INTEGER);\n-- +migrate Down\nDROP TABLE c;"),
        ("notes.sql", ""),
    ];

    #[test]
    fn test_healthy_store_passes() {
        let source = EmbeddedSource::new(HEALTHY);
        let doctor = DoctorService::new(&source, Dialect::Postgres);
        let result = doctor.run_checks(None, &Ledger::default()).unwrap();

        assert!(result.is_healthy());
        assert_eq!(result.summary.passed, 5);
        assert_eq!(result.summary.warnings, 0);
    }

    #[test]
    fn test_problems_are_classified() {
        let source = EmbeddedSource::new(UNHEALTHY);
        let doctor = DoctorService::new(&source, Dialect::DuckDb);
        let result = doctor.run_checks(None, &Ledger::default()).unwrap();

        assert_eq!(result.checks["filenames"].status, CheckStatus::Error);
        assert_eq!(result.checks["up_sections"].status, CheckStatus::Error);
        assert_eq!(result.checks["down_sections"].status, CheckStatus::Warning);
        assert_eq!(result.checks["sql_syntax"].status, CheckStatus::Warning);
        assert!(!result.is_healthy());
    }

    #[test]
    fn test_orphaned_ledger_versions() {
        let mut db = DuckDbDatabase::in_memory().unwrap();
        let ledger = Ledger::default();
        ledger.ensure_table(&mut db).unwrap();
        ledger.record_applied(&mut db, "001").unwrap();
        ledger.record_applied(&mut db, "004").unwrap();

        let source = EmbeddedSource::new(HEALTHY);
        let doctor = DoctorService::new(&source, Dialect::DuckDb);
        let result = doctor.run_checks(Some(&mut db), &ledger).unwrap();

        let check = &result.checks["orphaned_ledger"];
        assert_eq!(check.status, CheckStatus::Warning);
        assert_eq!(check.details.as_ref().unwrap()[0]["version"], "004");
    }

    #[test]
    fn test_missing_ledger_table_passes() {
        let mut db = DuckDbDatabase::in_memory().unwrap();
        let source = EmbeddedSource::new(HEALTHY);
        let doctor = DoctorService::new(&source, Dialect::DuckDb);
        let result = doctor.run_checks(Some(&mut db), &Ledger::default()).unwrap();
        assert_eq!(result.checks["orphaned_ledger"].status, CheckStatus::Pass);
    }

    #[test]
    fn test_unreadable_ledger_is_an_error() {
        let mut db = DuckDbDatabase::in_memory().unwrap();
        db.batch_execute("CREATE TABLE schema_migrations (foo INTEGER)").unwrap();

        let source = EmbeddedSource::new(HEALTHY);
        let doctor = DoctorService::new(&source, Dialect::DuckDb);
        let result = doctor.run_checks(Some(&mut db), &Ledger::default()).unwrap();

        let check = &result.checks["orphaned_ledger"];
        assert_eq!(check.status, CheckStatus::Error);
        assert!(check.message.contains("schema_migrations"));
        assert!(!result.is_healthy());
    }
}
