//! Migration runner - applies and reverses migrations against one database
//!
//! Each version moves through `pending -> applying -> applied` on the way up
//! and `applied -> rolling back -> pending` on the way down. One version is
//! fully committed or fully rolled back before the next one starts.
//!
//! `migrate` is fail-fast: the first failure stops the batch. `rollback` is
//! best-effort about *missing files* only: a ledger version with no file on
//! disk is dropped from the ledger with a warning and the remaining versions
//! are still reversed. Script failures stop a rollback just like a migrate.

use std::collections::HashSet;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::result::{Error, Result};
use crate::domain::{Direction, LedgerEntry, MigrationFile, Version};
use crate::ports::{in_transaction, Database, MigrationSource};
use crate::services::ledger::Ledger;
use crate::services::store::MigrationStore;

/// Progress notifications emitted while a command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Applying { version: String, filename: String },
    Applied { version: String, filename: String },
    RollingBack { version: String, filename: String },
    RolledBack { version: String, filename: String },
    Skipped { version: String, reason: String },
    Marked { version: String, filename: String },
}

/// A migration touched by a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRef {
    pub version: String,
    pub filename: String,
}

impl From<&MigrationFile> for MigrationRef {
    fn from(m: &MigrationFile) -> Self {
        Self {
            version: m.version.to_string(),
            filename: m.filename.clone(),
        }
    }
}

/// Result of [`MigrationRunner::migrate`]
#[derive(Debug, Default, Serialize)]
pub struct MigrateResult {
    /// Newly applied migrations, in order
    pub applied: Vec<MigrationRef>,
    /// Migrations that were already in the ledger
    pub already_applied: usize,
    /// Pending migrations left alone because they are above the target
    pub held_back: usize,
}

/// Result of [`MigrationRunner::rollback`]
#[derive(Debug, Default, Serialize)]
pub struct RollbackResult {
    /// Reversed migrations, highest version first
    pub rolled_back: Vec<MigrationRef>,
    /// Ledger versions dropped without running a script (file missing)
    pub skipped: Vec<String>,
    pub warnings: Vec<String>,
}

/// Result of [`MigrationRunner::status`]
#[derive(Debug, Default, Serialize)]
pub struct StatusReport {
    pub applied: Vec<LedgerEntry>,
    pub pending: Vec<MigrationRef>,
    /// Ledger versions with no migration file
    pub orphaned: Vec<String>,
    /// Files the store could not use (bad names, duplicate versions)
    pub problems: Vec<String>,
}

type Observer<'a> = Box<dyn FnMut(&RunEvent) + 'a>;

/// Orchestrates the store, the ledger and the database for one command
pub struct MigrationRunner<'a> {
    db: &'a mut dyn Database,
    store: MigrationStore<'a>,
    ledger: Ledger,
    use_lock: bool,
    observer: Option<Observer<'a>>,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(db: &'a mut dyn Database, source: &'a dyn MigrationSource) -> Self {
        Self {
            db,
            store: MigrationStore::new(source),
            ledger: Ledger::default(),
            use_lock: false,
            observer: None,
        }
    }

    /// Use a custom ledger table
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Hold the backend's migration lock for the whole of each mutating command
    pub fn with_lock(mut self, use_lock: bool) -> Self {
        self.use_lock = use_lock;
        self
    }

    /// Receive [`RunEvent`]s as work progresses
    pub fn with_observer(mut self, observer: impl FnMut(&RunEvent) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Apply pending migrations in version order
    ///
    /// With a `target`, pending versions above it stay pending. The target is
    /// zero-padded to the store's version width.
    pub fn migrate(&mut self, target: Option<&str>) -> Result<MigrateResult> {
        self.locked(|runner| runner.migrate_unlocked(target))
    }

    fn migrate_unlocked(&mut self, target: Option<&str>) -> Result<MigrateResult> {
        self.ledger.ensure_table(&mut *self.db)?;
        let applied: HashSet<String> =
            self.ledger.applied_versions(&mut *self.db)?.into_iter().collect();
        let migrations = self.store.load()?;

        let target = match target {
            Some(t) => Some(normalize_version(t, &migrations)?),
            None => None,
        };

        let (done, pending): (Vec<MigrationFile>, Vec<MigrationFile>) = migrations
            .into_iter()
            .partition(|m| applied.contains(m.version.as_str()));

        let mut result = MigrateResult {
            already_applied: done.len(),
            ..Default::default()
        };

        for (idx, migration) in pending.iter().enumerate() {
            if let Some(target) = &target {
                if migration.version > *target {
                    result.held_back = pending.len() - idx;
                    break;
                }
            }
            self.apply(migration)?;
            result.applied.push(MigrationRef::from(migration));
        }

        Ok(result)
    }

    /// Run one up script and record it, in a single transaction
    fn apply(&mut self, migration: &MigrationFile) -> Result<()> {
        let sql = migration.script(Direction::Up)?;
        self.emit(RunEvent::Applying {
            version: migration.version.to_string(),
            filename: migration.filename.clone(),
        });

        let ledger = &self.ledger;
        let version = migration.version.as_str();
        in_transaction(&mut *self.db, |db| {
            db.batch_execute(sql)?;
            ledger.record_applied(db, version)
        })
        .map_err(|e| e.in_migration(&migration.filename))?;

        self.emit(RunEvent::Applied {
            version: migration.version.to_string(),
            filename: migration.filename.clone(),
        });
        Ok(())
    }

    /// Reverse the `steps` most recently applied versions, highest first
    pub fn rollback(&mut self, steps: usize) -> Result<RollbackResult> {
        self.locked(|runner| runner.rollback_unlocked(steps))
    }

    fn rollback_unlocked(&mut self, steps: usize) -> Result<RollbackResult> {
        self.ledger.ensure_table(&mut *self.db)?;
        let applied = self.ledger.applied_versions(&mut *self.db)?;

        let mut result = RollbackResult::default();
        let targets: Vec<String> = applied.into_iter().rev().take(steps).collect();

        for version in targets {
            match self.store.find(&version)? {
                Some(migration) => {
                    self.revert(&migration)?;
                    result.rolled_back.push(MigrationRef::from(&migration));
                }
                None => {
                    let reason = format!(
                        "no migration file for version {} in {}; removed from ledger without running a down script",
                        version,
                        self.store.describe()
                    );
                    self.ledger.record_rolled_back(&mut *self.db, &version)?;
                    self.emit(RunEvent::Skipped {
                        version: version.clone(),
                        reason: reason.clone(),
                    });
                    result.warnings.push(reason);
                    result.skipped.push(version);
                }
            }
        }

        Ok(result)
    }

    /// Run one down script and drop its ledger row, in a single transaction
    fn revert(&mut self, migration: &MigrationFile) -> Result<()> {
        let sql = migration.script(Direction::Down)?;
        self.emit(RunEvent::RollingBack {
            version: migration.version.to_string(),
            filename: migration.filename.clone(),
        });

        let ledger = &self.ledger;
        let version = migration.version.as_str();
        in_transaction(&mut *self.db, |db| {
            db.batch_execute(sql)?;
            ledger.record_rolled_back(db, version)
        })
        .map_err(|e| e.in_migration(&migration.filename))?;

        self.emit(RunEvent::RolledBack {
            version: migration.version.to_string(),
            filename: migration.filename.clone(),
        });
        Ok(())
    }

    /// Applied and pending migrations; read-only apart from creating the ledger
    pub fn status(&mut self) -> Result<StatusReport> {
        self.ledger.ensure_table(&mut *self.db)?;
        let entries = self.ledger.entries(&mut *self.db)?;
        let survey = self.store.survey()?;

        let applied: HashSet<&str> = entries.iter().map(|e| e.version.as_str()).collect();
        let known: HashSet<&str> = survey.migrations.iter().map(|m| m.version.as_str()).collect();

        let pending = survey
            .migrations
            .iter()
            .filter(|m| !applied.contains(m.version.as_str()))
            .map(MigrationRef::from)
            .collect();
        let orphaned = entries
            .iter()
            .filter(|e| !known.contains(e.version.as_str()))
            .map(|e| e.version.clone())
            .collect();

        Ok(StatusReport {
            applied: entries.clone(),
            pending,
            orphaned,
            problems: survey.problems,
        })
    }

    /// Record `version` as applied without running it
    ///
    /// Used to adopt a database whose schema predates the ledger. Returns
    /// `false` when the version was already recorded.
    pub fn mark(&mut self, version: &str) -> Result<bool> {
        self.locked(|runner| runner.mark_unlocked(version))
    }

    fn mark_unlocked(&mut self, version: &str) -> Result<bool> {
        self.ledger.ensure_table(&mut *self.db)?;
        let migrations = self.store.load()?;
        let version = normalize_version(version, &migrations)?;
        let migration = migrations
            .iter()
            .find(|m| m.version == version)
            .ok_or_else(|| Error::UnknownVersion(version.to_string()))?;

        if self.ledger.contains(&mut *self.db, version.as_str())? {
            return Ok(false);
        }
        self.ledger.record_applied(&mut *self.db, version.as_str())?;
        self.emit(RunEvent::Marked {
            version: version.to_string(),
            filename: migration.filename.clone(),
        });
        Ok(true)
    }

    /// Run `f` while holding the migration lock; the lock is released on
    /// every exit path
    fn locked<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if !self.use_lock {
            return f(self);
        }

        let key = lock_key(self.ledger.table().as_str());
        self.db.lock(key)?;
        let result = f(self);
        let released = self.db.unlock(key);
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), _) => Err(e),
        }
    }

    fn emit(&mut self, event: RunEvent) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }
}

/// Validate a user-supplied version and pad it to the store's width
fn normalize_version(raw: &str, migrations: &[MigrationFile]) -> Result<Version> {
    let version = Version::parse(raw)?;
    match migrations.first() {
        Some(first) => version.pad_to(first.version.width()),
        None => Ok(version),
    }
}

/// Advisory lock key derived from the ledger table, so runners sharing a
/// ledger exclude each other and runners with different ledgers do not
pub fn lock_key(ledger_table: &str) -> i64 {
    let digest = Sha256::digest(format!("pgmigrate:{}", ledger_table).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbDatabase;
    use crate::adapters::embedded::EmbeddedSource;

    static TWO: &[(&str, &str)] = &[
        (
            "001_create_table.sql",
            "-- +migrate Up\nCREATE TABLE t(id int);\n-- +migrate Down\nDROP TABLE t;",
        ),
        (
            "002_add_col.sql",
            "-- +migrate Up\nALTER TABLE t ADD COLUMN v int;\n-- +migrate Down\nALTER TABLE t DROP COLUMN v;",
        ),
    ];

    #[test]
    fn test_migrate_then_noop() {
        let mut db = DuckDbDatabase::in_memory().unwrap();
        let source = EmbeddedSource::new(TWO);
        let mut runner = MigrationRunner::new(&mut db, &source);

        let first = runner.migrate(None).unwrap();
        assert_eq!(first.applied.len(), 2);
        assert_eq!(first.already_applied, 0);

        let second = runner.migrate(None).unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.already_applied, 2);
    }

    #[test]
    fn test_target_is_padded() {
        let mut db = DuckDbDatabase::in_memory().unwrap();
        let source = EmbeddedSource::new(TWO);
        let mut runner = MigrationRunner::new(&mut db, &source);

        let result = runner.migrate(Some("1")).unwrap();
        assert_eq!(result.applied.len(), 1);
        assert_eq!(result.applied[0].version, "001");
        assert_eq!(result.held_back, 1);

        assert!(matches!(runner.migrate(Some("x1")), Err(Error::InvalidVersion(_))));
    }

    #[test]
    fn test_events_follow_state_transitions() {
        let mut db = DuckDbDatabase::in_memory().unwrap();
        let source = EmbeddedSource::new(TWO);
        let mut events = Vec::new();
        {
            let mut runner =
                MigrationRunner::new(&mut db, &source).with_observer(|e| events.push(e.clone()));
            runner.migrate(Some("001")).unwrap();
            runner.rollback(1).unwrap();
        }

        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                RunEvent::Applying { .. } => "applying",
                RunEvent::Applied { .. } => "applied",
                RunEvent::RollingBack { .. } => "rolling_back",
                RunEvent::RolledBack { .. } => "rolled_back",
                RunEvent::Skipped { .. } => "skipped",
                RunEvent::Marked { .. } => "marked",
            })
            .collect();
        assert_eq!(kinds, vec!["applying", "applied", "rolling_back", "rolled_back"]);
    }

    #[test]
    fn test_rollback_zero_steps_is_noop() {
        let mut db = DuckDbDatabase::in_memory().unwrap();
        let source = EmbeddedSource::new(TWO);
        let mut runner = MigrationRunner::new(&mut db, &source);
        runner.migrate(None).unwrap();

        let result = runner.rollback(0).unwrap();
        assert!(result.rolled_back.is_empty());
        assert_eq!(runner.status().unwrap().applied.len(), 2);
    }

    #[test]
    fn test_mark_records_without_running() {
        let mut db = DuckDbDatabase::in_memory().unwrap();
        let source = EmbeddedSource::new(TWO);
        {
            let mut runner = MigrationRunner::new(&mut db, &source);
            assert!(runner.mark("001").unwrap());
            assert!(!runner.mark("1").unwrap());
            assert!(matches!(runner.mark("007"), Err(Error::UnknownVersion(_))));
        }
        // The up script never ran
        assert!(!db.table_exists("t").unwrap());
    }

    #[test]
    fn test_lock_key_depends_on_table() {
        assert_eq!(lock_key("schema_migrations"), lock_key("schema_migrations"));
        assert_ne!(lock_key("schema_migrations"), lock_key("ops.schema_migrations"));
    }
}
