//! Error types for parsing in weather-types.

use thiserror::Error;

/// Errors that can occur when parsing query vocabulary from strings.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The name does not match any sortable report field.
    #[error("Unknown sort field: {0}")]
    UnknownSortField(String),

    /// The value is neither `asc` nor `desc`.
    #[error("Unknown sort order: {0} (expected 'asc' or 'desc')")]
    UnknownSortOrder(String),
}

/// Result type alias using weather-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
