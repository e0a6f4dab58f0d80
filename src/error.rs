//! Error types for catalog building, schema resolution, and validation.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors during schema resolution.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unresolvable reference \"{pointer}\" at {path}")]
    DanglingRef { pointer: String, path: String },

    #[error("reference \"{pointer}\" exceeds resolution depth limit of {limit}")]
    CycleDepthExceeded { pointer: String, limit: usize },

    #[error("incompatible allOf branches at {path}: type \"{left}\" vs \"{right}\"")]
    IncompatibleAllOf {
        path: String,
        left: String,
        right: String,
    },

    #[error("invalid schema at {path}: {message}")]
    InvalidSchema { path: String, message: String },
}

/// Errors surfaced by the catalog engine.
#[derive(Debug, Error)]
pub enum CatalogError {
    // IO errors (exit code 3)
    #[error("specification directory not found: {}", path.display())]
    SpecDirNotFound { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Schema/catalog errors (exit code 2)
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to parse document {}: {message}", path.display())]
    DocumentParse { path: PathBuf, message: String },

    #[error("unknown endpointId \"{endpoint_id}\"")]
    UnknownEndpoint { endpoint_id: String },

    #[error("no document indexed successfully ({failures} failure(s))")]
    EmptyCatalog { failures: usize },

    #[error("rebuild exceeded budget of {budget:?}")]
    RebuildTimeout { budget: Duration },

    #[error("search index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("query parse error: {message}")]
    QueryParse { message: String },
}

/// Single validation error with path context.
///
/// Not an exception: validation produces these as first-class values inside a
/// [`ValidationReport`](crate::model::ValidationReport), never as `Err`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationError {
    /// Dotted path to the invalid field (e.g. `body.kind`).
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl CatalogError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CatalogError::SpecDirNotFound { .. } | CatalogError::ReadError { .. } => 3,
            _ => 2,
        }
    }
}
