//! Error types for schemasync.
//!
//! A no-op reconciliation is not an error: operations report it as `Ok(false)`.
//! Everything here is a structural failure the caller can inspect or log.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the schemasync library.
#[derive(Debug, Error)]
pub enum SyncError {
    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Migration of {table} rolled back: {message}")]
    Migration {
        table: String,
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Validation errors
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid limit: {0:?}")]
    InvalidLimit(String),
}

/// Result type alias for schemasync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SyncError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Wrap a failure that aborted the migration of `table`.
    pub(crate) fn migration(table: &str, err: SyncError) -> Self {
        match err {
            SyncError::Database { message, source } => SyncError::Migration {
                table: table.to_string(),
                message,
                source,
            },
            other => SyncError::Migration {
                table: table.to_string(),
                message: other.to_string(),
                source: None,
            },
        }
    }

    /// True when the engine rejected a statement (as opposed to bad input).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SyncError::Database { .. } | SyncError::Migration { .. }
        )
    }
}
