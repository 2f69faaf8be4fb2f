//! On-disk migration directory

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::result::Result;
use crate::ports::MigrationSource;

/// Default migration file extension
pub const DEFAULT_EXTENSION: &str = "sql";

/// Migration files stored as `<version>_<name>.<ext>` in one directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    extension: String,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_extension(dir, DEFAULT_EXTENSION)
    }

    pub fn with_extension(dir: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl MigrationSource for DirectorySource {
    /// A missing directory is an empty store
    fn list_files(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let suffix = format!(".{}", self.extension);
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(&suffix) {
                    files.push(name.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn read(&self, filename: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.dir.join(filename)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let source = DirectorySource::new(dir.path().join("nope"));
        assert!(source.list_files().unwrap().is_empty());
        assert_eq!(source.read("001_a.sql").unwrap(), None);
    }

    #[test]
    fn test_lists_sorted_and_filters_extension() {
        let dir = tempdir().unwrap();
        for name in ["002_b.sql", "001_a.sql", "README.md", "010_c.sql", "003_d.sql.bak"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("004_dir.sql")).unwrap();

        let source = DirectorySource::new(dir.path());
        let files = source.list_files().unwrap();
        assert_eq!(files, vec!["001_a.sql", "002_b.sql", "010_c.sql"]);

        // Listing has no side effects
        assert_eq!(source.list_files().unwrap(), files);
    }

    #[test]
    fn test_custom_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("001_a.pgsql"), "x").unwrap();
        fs::write(dir.path().join("002_b.sql"), "y").unwrap();

        let source = DirectorySource::with_extension(dir.path(), ".pgsql");
        assert_eq!(source.list_files().unwrap(), vec!["001_a.pgsql"]);
        assert_eq!(source.read("001_a.pgsql").unwrap().as_deref(), Some("x"));
    }
}
