//! Error types for formkeeper.
//!
//! This module defines the error enum shared by the storage, configuration,
//! schema, backup and export layers. Formula failures never appear here; the
//! evaluator yields an empty result for them.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for formkeeper operations.
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

    // === Document Errors ===
    /// A schema template was rejected.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// Why the template was rejected.
        message: String,
    },

    /// A backup document was rejected.
    #[error("invalid backup: {message}")]
    InvalidBackup {
        /// Why the backup was rejected.
        message: String,
    },

    // === Record Errors ===
    /// No record with the given id exists in the collection.
    #[error("record not found: {id}")]
    RecordNotFound {
        /// The id that was looked up.
        id: String,
    },

    /// A value was assigned to a field the schema does not declare.
    #[error("unknown field '{id}'")]
    UnknownField {
        /// The offending field id.
        id: String,
    },

    /// A value was assigned to a calculated field.
    #[error("field '{id}' is calculated and cannot be edited")]
    CalculatedField {
        /// The calculated field id.
        id: String,
    },

    // === Export Errors ===
    /// Rendering an export document failed.
    #[error("export failed: {0}")]
    Export(String),

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
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for formkeeper operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new invalid schema error.
    #[must_use]
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Create a new invalid backup error.
    #[must_use]
    pub fn invalid_backup(message: impl Into<String>) -> Self {
        Self::InvalidBackup {
            message: message.into(),
        }
    }

    /// Create a new record-not-found error.
    #[must_use]
    pub fn record_not_found(id: impl Into<String>) -> Self {
        Self::RecordNotFound { id: id.into() }
    }

    /// Create a new export error.
    #[must_use]
    pub fn export(message: impl Into<String>) -> Self {
        Self::Export(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is a rejected user document (schema or backup).
    ///
    /// These are reported to the user as-is; nothing was applied.
    #[must_use]
    pub fn is_rejected_document(&self) -> bool {
        matches!(self, Self::InvalidSchema { .. } | Self::InvalidBackup { .. })
    }

    /// Check if this error means a record id was not found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RecordNotFound { .. })
    }
}
