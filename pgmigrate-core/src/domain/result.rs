//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed migration filename '{filename}': {reason}")]
    MalformedFilename { filename: String, reason: String },

    #[error("Duplicate migration version {version}: {first} and {second}")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    #[error("Migration versions must share one width: '{filename}' has {found} digits, expected {expected}")]
    VersionWidthMismatch {
        filename: String,
        expected: usize,
        found: usize,
    },

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Version space exhausted: no version after {last} fits in {width} digits")]
    VersionSpaceExhausted { last: String, width: usize },

    #[error("No migration file found for version {0}")]
    UnknownVersion(String),

    #[error("No up migration found in {0}")]
    NoUpScript(String),

    #[error("No down migration found in {0}")]
    NoDownScript(String),

    #[error("Migration {filename} failed: {message}")]
    Execution { filename: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cannot connect to database: {0}")]
    Connectivity(String),

    #[error("Could not acquire migration lock: {0}")]
    Lock(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a malformed filename error
    pub fn malformed(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedFilename {
            filename: filename.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attach the offending migration file to a database failure
    pub fn in_migration(self, filename: &str) -> Self {
        match self {
            Self::Database(message) => Self::Execution {
                filename: filename.to_string(),
                message,
            },
            other => other,
        }
    }
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;
