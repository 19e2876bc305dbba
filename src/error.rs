//! Error types for Hindsight
//!
//! This module defines the single error type used throughout the crate and
//! the `Result` alias every fallible operation returns. Absence of a record
//! is never an error: point lookups return `Ok(None)` instead.

use thiserror::Error;

/// Result type alias for Hindsight operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Unified error type for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure while preparing the database file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying storage failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Object encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(String),

    /// A caller-supplied key, version, or index function failed
    #[error("User function error: {0}")]
    UserFunc(String),

    /// A query referenced an index name that was never registered
    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    /// A query referenced a field that was never registered
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// A list query carried a revision that is not a decimal integer
    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    /// An index or field name failed the schema-injection guard
    #[error("Invalid name: {0:?} (double quotes are not supported)")]
    InvalidName(String),

    /// The database handle was closed; all dependents are invalid
    #[error("Cache is closed")]
    Closed,
}

impl CacheError {
    /// Create a codec error from any displayable cause
    pub fn codec(detail: impl Into<String>) -> Self {
        CacheError::Codec(detail.into())
    }

    /// Create a user-function error from any displayable cause
    pub fn user_func(detail: impl Into<String>) -> Self {
        CacheError::UserFunc(detail.into())
    }
}
