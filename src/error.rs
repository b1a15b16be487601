//! Error taxonomy for region-annotator.
//!
//! Library code returns [`Error`]; the binary wraps it with `anyhow` for
//! reporting. Directory ingestion recovers from `Format` errors per file;
//! everything else is fail-fast.

use std::path::Path;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The embedded store could not be opened or configured.
    #[error("database connection failed: {0}")]
    Connection(String),

    /// A data operation was attempted without an open connection.
    #[error("no open database connection")]
    NotConnected,

    /// A table was created under an existing name without overwrite.
    #[error("dataset already exists: {0}")]
    DuplicateDataset(String),

    /// A dataset (table, view, or schema template) was referenced but does
    /// not exist.
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    /// The store rejected a query or DDL statement.
    #[error("query failed: {0}")]
    Query(String),

    /// An input file could not be parsed, or an output artifact could not
    /// be produced.
    #[error("format error in {location}: {detail}")]
    Format { location: String, detail: String },

    /// A row value does not match (and cannot be coerced to) the declared
    /// column type, or names a column the schema does not declare.
    #[error("type mismatch in column {column}: {detail}")]
    TypeMismatch { column: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a `Format` error tagged with the offending file or artifact.
    pub fn format(location: impl AsRef<Path>, detail: impl std::fmt::Display) -> Self {
        Error::Format {
            location: location.as_ref().display().to_string(),
            detail: detail.to_string(),
        }
    }

    /// Build a `TypeMismatch` error for a named column.
    pub fn type_mismatch(column: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Error::TypeMismatch {
            column: column.into(),
            detail: detail.to_string(),
        }
    }
}
