//! Error types for the migration core.

use thiserror::Error;

/// Errors that can occur while reading an export or writing entries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrateError {
    /// The source record cannot be migrated (missing or empty name).
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// The destination group is not part of the open database.
    #[error("Group {0} does not belong to the open database")]
    Container(String),

    /// An entry handle no longer resolves to an entry.
    #[error("Entry with UUID {0} not found")]
    EntryNotFound(String),

    /// Error deserializing the export document.
    #[error("JSON error: {0}")]
    Json(String),

    /// The export was written with Bitwarden's password protection.
    #[error("Encrypted exports are not supported, export as unencrypted JSON")]
    EncryptedExport,
}

impl From<serde_json::Error> for MigrateError {
    fn from(err: serde_json::Error) -> Self {
        MigrateError::Json(err.to_string())
    }
}

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;
