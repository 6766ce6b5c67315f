//! Error types for promptshield.
//!
//! This module defines all error types used throughout the promptshield crate.
//! Most of them never reach the host page: listener entry points log and
//! swallow them, so they exist mainly for the library API and the CLI.

use std::path::PathBuf;
use thiserror::Error;

use crate::dom::ElementId;

/// The main error type for promptshield operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The durable store rejected a read or write.
    #[error("storage unavailable: {message}")]
    StorageUnavailable {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Detection Errors ===
    /// A detection pattern failed to compile.
    #[error("invalid pattern '{name}': {source}")]
    InvalidPattern {
        /// Name of the pattern.
        name: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A pattern id string could not be parsed.
    #[error("unknown pattern id: {0}")]
    UnknownPattern(String),

    // === DOM Errors ===
    /// The element is no longer attached to the document.
    #[error("element {0} is detached from the document")]
    ElementDetached(ElementId),

    /// A DOM operation failed.
    #[error("DOM error: {0}")]
    Dom(String),

    // === Interception Errors ===
    /// Redaction could not be applied to the live input.
    #[error("redaction failed: {reason}")]
    RedactionFailed {
        /// Why the redaction was abandoned.
        reason: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for promptshield operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new DOM error.
    #[must_use]
    pub fn dom(message: impl Into<String>) -> Self {
        Self::Dom(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a storage unavailable error.
    #[must_use]
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable {
            message: message.into(),
        }
    }

    /// Create a redaction failure.
    #[must_use]
    pub fn redaction_failed(reason: impl Into<String>) -> Self {
        Self::RedactionFailed {
            reason: reason.into(),
        }
    }

    /// Check if this error means the target element left the document.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        matches!(self, Self::ElementDetached(_))
    }

    /// Check if this error came from the durable store.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. }
                | Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
        )
    }
}
