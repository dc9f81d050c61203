//! Error types for the model crate.

use thiserror::Error;

/// Model error type covering invalid persisted or user-supplied values.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    /// A rule carried a regular expression that does not compile.
    #[error("invalid rule pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },

    /// A sort key was not one of the known keys.
    #[error("unknown sort key: {0}")]
    UnknownSortKey(String),

    /// A sort order was neither ascending nor descending.
    #[error("unknown sort order: {0}")]
    UnknownSortOrder(String),

    /// A view mode was not recognised.
    #[error("unknown view mode: {0}")]
    UnknownViewMode(String),
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
