//! Error types for weather-store.

use std::path::PathBuf;

/// Result type for weather-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in weather-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite while opening or migrating.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A query or count against a collection failed.
    #[error("Failed to read {collection}: {message}")]
    Read {
        collection: &'static str,
        message: String,
    },

    /// An insert or delete against a collection failed.
    #[error("Failed to write {collection}: {message}")]
    Write {
        collection: &'static str,
        message: String,
    },

    /// No report matches the identifier.
    #[error("Report not found: {0}")]
    NotFound(String),

    /// Instant outside the range the store can represent.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl Error {
    /// Wrap a failure while reading `collection`.
    pub fn read(collection: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Read {
            collection,
            message: err.to_string(),
        }
    }

    /// Wrap a failure while writing `collection`.
    pub fn write(collection: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Write {
            collection,
            message: err.to_string(),
        }
    }

    /// Whether this is the not-found outcome of an id lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
