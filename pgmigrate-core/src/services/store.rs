//! Migration store - enumerates and parses migration files from a source

use std::collections::HashMap;

use crate::domain::result::{Error, Result};
use crate::domain::{MigrationFile, Version};
use crate::ports::MigrationSource;

/// Ordered, validated view over a [`MigrationSource`]
pub struct MigrationStore<'a> {
    source: &'a dyn MigrationSource,
}

impl<'a> MigrationStore<'a> {
    pub fn new(source: &'a dyn MigrationSource) -> Self {
        Self { source }
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// Migration filenames, sorted ascending
    pub fn list_files(&self) -> Result<Vec<String>> {
        let mut files = self.source.list_files()?;
        files.sort();
        Ok(files)
    }

    /// Version token of a filename (text before the first `_`)
    pub fn version_of(&self, filename: &str) -> Result<Version> {
        Version::from_filename(filename)
    }

    /// Load and parse every migration, ordered by version
    ///
    /// Fails on malformed filenames, duplicate versions, and versions of
    /// differing widths (string order would no longer be numeric order).
    pub fn load(&self) -> Result<Vec<MigrationFile>> {
        let mut migrations = Vec::new();
        for filename in self.list_files()? {
            // A file can disappear between listing and reading
            let Some(contents) = self.source.read(&filename)? else {
                continue;
            };
            migrations.push(MigrationFile::parse(&filename, &contents)?);
        }
        migrations.sort_by(|a, b| a.version.cmp(&b.version));

        match validate(&migrations).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(migrations),
        }
    }

    /// Best-effort load that reports problems instead of failing on them
    ///
    /// Malformed files are left out; of two files sharing a version only the
    /// first is kept. Read errors still fail.
    pub fn survey(&self) -> Result<StoreSurvey> {
        let mut survey = StoreSurvey::default();
        for filename in self.list_files()? {
            let Some(contents) = self.source.read(&filename)? else {
                continue;
            };
            match MigrationFile::parse(&filename, &contents) {
                Ok(migration) => survey.migrations.push(migration),
                Err(e) => survey.problems.push(e.to_string()),
            }
        }
        survey.migrations.sort_by(|a, b| a.version.cmp(&b.version));
        survey
            .problems
            .extend(validate(&survey.migrations).iter().map(|e| e.to_string()));
        survey.migrations.dedup_by(|b, a| a.version == b.version);
        Ok(survey)
    }

    /// Locate the file for `version` by its prefix
    ///
    /// Unrelated malformed files are ignored so a single bad name elsewhere in
    /// the store does not prevent reversing a known version.
    pub fn find(&self, version: &str) -> Result<Option<MigrationFile>> {
        for filename in self.list_files()? {
            match Version::from_filename(&filename) {
                Ok(v) if v.as_str() == version => {}
                _ => continue,
            }
            if let Some(contents) = self.source.read(&filename)? {
                return MigrationFile::parse(&filename, &contents).map(Some);
            }
        }
        Ok(None)
    }

    /// Width shared by all versions in the store, if any exist
    pub fn version_width(&self) -> Result<Option<usize>> {
        Ok(self.load()?.first().map(|m| m.version.width()))
    }
}

/// Result of [`MigrationStore::survey`]
#[derive(Debug, Default)]
pub struct StoreSurvey {
    pub migrations: Vec<MigrationFile>,
    pub problems: Vec<String>,
}

/// Duplicate versions and mixed version widths in a version-sorted list
fn validate(migrations: &[MigrationFile]) -> Vec<Error> {
    let mut errors = Vec::new();
    let mut seen: HashMap<&Version, &str> = HashMap::new();
    let width = migrations.first().map(|m| m.version.width());

    for migration in migrations {
        if let Some(expected) = width {
            if migration.version.width() != expected {
                errors.push(Error::VersionWidthMismatch {
                    filename: migration.filename.clone(),
                    expected,
                    found: migration.version.width(),
                });
            }
        }
        if let Some(first) = seen.insert(&migration.version, &migration.filename) {
            errors.push(Error::DuplicateVersion {
                version: migration.version.to_string(),
                first: first.to_string(),
                second: migration.filename.clone(),
            });
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::embedded::EmbeddedSource;

    static OUT_OF_ORDER: &[(&str, &str)] = &[
        ("002_add_col.sql", "-- +migrate Up\nALTER TABLE t ADD COLUMN v int;"),
        ("001_create_table.sql", "-- +migrate Up\nCREATE TABLE t(id int);"),
    ];

    #[test]
    fn test_load_sorts_by_version() {
        let source = EmbeddedSource::new(OUT_OF_ORDER);
        let store = MigrationStore::new(&source);
        let versions: Vec<String> = store
            .load()
            .unwrap()
            .iter()
            .map(|m| m.version.to_string())
            .collect();
        assert_eq!(versions, vec!["001", "002"]);
        assert_eq!(store.version_width().unwrap(), Some(3));
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        static DUPES: &[(&str, &str)] = &[("001_a.sql", ""), ("001_b.sql", "")];
        let source = EmbeddedSource::new(DUPES);
        let err = MigrationStore::new(&source).load().unwrap_err();
        assert!(matches!(err, Error::DuplicateVersion { .. }));
    }

    #[test]
    fn test_mixed_widths_rejected() {
        static MIXED: &[(&str, &str)] = &[("001_a.sql", ""), ("0002_b.sql", "")];
        let source = EmbeddedSource::new(MIXED);
        let err = MigrationStore::new(&source).load().unwrap_err();
        assert!(matches!(err, Error::VersionWidthMismatch { expected: 4, found: 3, .. }));
    }

    #[test]
    fn test_malformed_name_rejected_on_load() {
        static BAD: &[(&str, &str)] = &[("001_a.sql", ""), ("init.sql", "")];
        let source = EmbeddedSource::new(BAD);
        let store = MigrationStore::new(&source);
        assert!(matches!(store.load(), Err(Error::MalformedFilename { .. })));
        assert!(matches!(store.version_of("init.sql"), Err(Error::MalformedFilename { .. })));

        // find() still locates well-formed files
        let found = store.find("001").unwrap().unwrap();
        assert_eq!(found.filename, "001_a.sql");
        assert!(store.find("002").unwrap().is_none());
    }

    #[test]
    fn test_survey_reports_problems() {
        static MESSY: &[(&str, &str)] = &[
            ("001_a.sql", "-- +migrate Up\nSELECT 1;"),
            ("001_b.sql", ""),
            ("notes.sql", ""),
            ("002_c.sql", ""),
        ];
        let source = EmbeddedSource::new(MESSY);
        let survey = MigrationStore::new(&source).survey().unwrap();
        let names: Vec<&str> = survey.migrations.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(names, vec!["001_a.sql", "002_c.sql"]);
        assert_eq!(survey.problems.len(), 2);
        assert!(survey.problems.iter().any(|p| p.contains("notes.sql")));
        assert!(survey.problems.iter().any(|p| p.contains("Duplicate")));
    }

    #[test]
    fn test_empty_store() {
        static NONE: &[(&str, &str)] = &[];
        let source = EmbeddedSource::new(NONE);
        let store = MigrationStore::new(&source);
        assert!(store.load().unwrap().is_empty());
        assert_eq!(store.version_width().unwrap(), None);
    }
}
