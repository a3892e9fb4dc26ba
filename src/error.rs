//! Error types for the record service.
//!
//! Driver failures (`DatabaseError`) are kept apart from the caller-facing
//! taxonomy (`ServiceError`) so the facade can decide, by variant, whether a
//! failure is recovered on the fallback store or reported.

use uuid::Uuid;

use crate::records::EntityKind;

/// Remote store driver errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[cfg(feature = "postgres")]
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}

/// Configuration resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read settings file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse settings file {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// A record failed the per-kind field rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField { field: &'static str },

    #[error("Field '{field}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        value: i64,
    },

    #[error("Field '{field}' must not be negative")]
    Negative { field: &'static str },

    #[error("Field '{field}' is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Blob store failures.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Blob rejected: {0}")]
    Rejected(String),

    #[error("Failed to sign blob URL: {0}")]
    Signing(String),
}

/// Caller-facing failure taxonomy of the record service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Remote store unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Remote store error: {0}")]
    Transient(String),

    #[error("File storage error: {0}")]
    Storage(String),
}

impl ServiceError {
    /// Whether the facade re-runs the operation on the fallback store.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::Transient(_))
    }
}

impl From<DatabaseError> for ServiceError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Pool(msg) => Self::BackendUnavailable(msg),
            other => Self::Transient(other.to_string()),
        }
    }
}

impl From<BlobError> for ServiceError {
    fn from(e: BlobError) -> Self {
        Self::Storage(e.to_string())
    }
}
