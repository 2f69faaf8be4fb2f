//! Migration authoring - scaffolds new migration files

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use regex::Regex;

use crate::adapters::directory::DirectorySource;
use crate::domain::result::{Error, Result};
use crate::domain::{Version, DOWN_MARKER, UP_MARKER};
use crate::ports::MigrationSource;

/// Width of the first version in an empty store
pub const DEFAULT_VERSION_WIDTH: usize = 3;

/// Lowercase `name` and replace anything outside `[a-z0-9_]` with `_`
pub fn slugify(name: &str) -> Result<String> {
    let special_re = Regex::new(r"[^a-z0-9_]").map_err(|e| Error::config(e.to_string()))?;
    Ok(special_re
        .replace_all(&name.trim().to_lowercase(), "_")
        .into_owned())
}

/// Body written into every new migration
pub fn template() -> String {
    format!(
        "{}\n-- Add your up migration here\n\n\n{}\n-- Add your down migration here (to undo the up migration)\n\n",
        UP_MARKER, DOWN_MARKER
    )
}

/// Version following the highest well-formed file in `source`
///
/// Files that do not start with a version are ignored. An empty (or missing)
/// directory starts at `001`. Versions never widen: after `999` this fails
/// with [`Error::VersionSpaceExhausted`].
pub fn next_version(source: &DirectorySource) -> Result<Version> {
    let last = source
        .list_files()?
        .iter()
        .filter_map(|f| Version::from_filename(f).ok())
        .max();

    match last {
        Some(version) => {
            let width = version.width().max(DEFAULT_VERSION_WIDTH);
            let next = version.next()?;
            // Existing files fix the width; a wider version would sort wrong
            if next.width() > width {
                return Err(Error::VersionSpaceExhausted {
                    last: version.as_str().to_string(),
                    width,
                });
            }
            next.pad_to(width)
        }
        None => Version::parse("1")?.pad_to(DEFAULT_VERSION_WIDTH),
    }
}

/// Create `<next version>_<slug>.<ext>` holding the Up/Down template
///
/// The migrations directory is created when missing. Returns the new path.
pub fn create_migration(source: &DirectorySource, name: &str) -> Result<PathBuf> {
    let slug = slugify(name)?;
    if slug.is_empty() {
        return Err(Error::malformed(name, "migration name must not be empty"));
    }

    fs::create_dir_all(source.dir())?;
    let version = next_version(source)?;
    let filename = format!("{}_{}.{}", version, slug, source.extension());
    let path = source.dir().join(&filename);

    let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
    file.write_all(template().as_bytes())?;

    Ok(path)
}
