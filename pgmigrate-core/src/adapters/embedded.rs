//! Migrations compiled into the binary

use crate::domain::result::Result;
use crate::ports::MigrationSource;

/// Static `(filename, contents)` table, typically built with `include_str!`
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedSource {
    files: &'static [(&'static str, &'static str)],
}

impl EmbeddedSource {
    pub const fn new(files: &'static [(&'static str, &'static str)]) -> Self {
        Self { files }
    }
}

impl MigrationSource for EmbeddedSource {
    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.iter().map(|(name, _)| name.to_string()).collect();
        names.sort();
        Ok(names)
    }

    fn read(&self, filename: &str) -> Result<Option<String>> {
        Ok(self
            .files
            .iter()
            .find(|(name, _)| *name == filename)
            .map(|(_, sql)| sql.to_string()))
    }

    fn describe(&self) -> String {
        "embedded migrations".to_string()
    }
}
