//! Migration file domain model

use std::fmt;

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Marker line that opens the forward script
pub const UP_MARKER: &str = "-- +migrate Up";

/// Marker line that opens the reverse script
pub const DOWN_MARKER: &str = "-- +migrate Down";

/// Migration version: a non-empty run of ASCII digits ("001", "20240101120000")
///
/// Versions compare as strings. That is only equivalent to numeric order when
/// every version has the same width, which the store enforces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Parse a user-supplied version (e.g. a migrate target)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if is_version_token(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidVersion(s.to_string()))
        }
    }

    /// Extract the version token from a filename (text before the first `_`)
    pub fn from_filename(filename: &str) -> Result<Self> {
        let (token, _) = filename
            .split_once('_')
            .ok_or_else(|| Error::malformed(filename, "missing '_' between version and name"))?;
        if !is_version_token(token) {
            return Err(Error::malformed(
                filename,
                format!("version '{}' must be digits only", token),
            ));
        }
        Ok(Self(token.to_string()))
    }

    /// Left-pad with zeros to `width` digits
    pub fn pad_to(&self, width: usize) -> Result<Self> {
        if self.0.len() > width {
            return Err(Error::InvalidVersion(format!(
                "{} (migrations use {}-digit versions)",
                self.0, width
            )));
        }
        Ok(Self(format!("{:0>width$}", self.0, width = width)))
    }

    /// Next version with the same width (or wider if it overflows)
    pub fn next(&self) -> Result<Self> {
        let n: u128 = self
            .0
            .parse()
            .map_err(|_| Error::InvalidVersion(self.0.clone()))?;
        Ok(Self(format!("{:0>width$}", n + 1, width = self.0.len())))
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_version_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Direction a migration is executed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Up and down bodies of one migration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub up: Option<String>,
    pub down: Option<String>,
}

/// Split file contents on the two marker lines
///
/// A section runs from its marker to the opposite marker (or end of file).
/// Markers must occupy a whole line; surrounding whitespace is ignored.
/// Bodies are trimmed. A section whose marker is absent is `None`.
pub fn parse_sections(contents: &str) -> Sections {
    let mut sections = Sections::default();
    let mut current: Option<(Direction, Vec<&str>)> = None;

    for line in contents.lines() {
        let marker = match line.trim() {
            UP_MARKER => Some(Direction::Up),
            DOWN_MARKER => Some(Direction::Down),
            _ => None,
        };

        match marker {
            Some(direction) => {
                if let Some((prev, lines)) = current.take() {
                    store_section(&mut sections, prev, &lines);
                }
                current = Some((direction, Vec::new()));
            }
            None => {
                if let Some((_, lines)) = current.as_mut() {
                    lines.push(line);
                }
            }
        }
    }

    if let Some((direction, lines)) = current {
        store_section(&mut sections, direction, &lines);
    }

    sections
}

fn store_section(sections: &mut Sections, direction: Direction, lines: &[&str]) {
    let body = lines.join("\n").trim().to_string();
    let slot = match direction {
        Direction::Up => &mut sections.up,
        Direction::Down => &mut sections.down,
    };
    // A repeated marker keeps the first section
    if slot.is_none() {
        *slot = Some(body);
    }
}

/// A versioned migration loaded from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: Version,
    pub name: String,
    pub filename: String,
    pub up: Option<String>,
    pub down: Option<String>,
}

impl MigrationFile {
    /// Build a migration from its filename and raw contents
    pub fn parse(filename: &str, contents: &str) -> Result<Self> {
        let version = Version::from_filename(filename)?;
        let rest = &filename[version.width() + 1..];
        let name = rest.rsplit_once('.').map_or(rest, |(stem, _)| stem);
        if name.is_empty() {
            return Err(Error::malformed(filename, "missing migration name"));
        }

        let sections = parse_sections(contents);
        Ok(Self {
            version,
            name: name.to_string(),
            filename: filename.to_string(),
            up: sections.up,
            down: sections.down,
        })
    }

    /// Script for a direction; absent or blank sections are an error
    pub fn script(&self, direction: Direction) -> Result<&str> {
        let body = match direction {
            Direction::Up => self.up.as_deref(),
            Direction::Down => self.down.as_deref(),
        };
        match body {
            Some(sql) if !sql.is_empty() => Ok(sql),
            _ => Err(match direction {
                Direction::Up => Error::NoUpScript(self.filename.clone()),
                Direction::Down => Error::NoDownScript(self.filename.clone()),
            }),
        }
    }
}
