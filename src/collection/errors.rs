//! Collection errors

use thiserror::Error;

/// Result type for collection operations
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Collection errors
#[derive(Debug, Clone, Error)]
pub enum CollectionError {
    // Resolution errors
    #[error("Collection '{name}' is unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("Invalid collection name: {0:?}")]
    InvalidName(String),

    #[error("Unknown collection type: {0}")]
    UnknownType(String),

    // Record errors
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Stored data for '{name}' is corrupt: {reason}")]
    Corrupt { name: String, reason: String },

    // Backend errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error("SQL error: {0}")]
    Sql(String),

    // Internal
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CollectionError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            CollectionError::Unavailable { .. }
            | CollectionError::InvalidName(_)
            | CollectionError::UnknownType(_) => "STORAGE_COLLECTION_UNAVAILABLE",
            CollectionError::InvalidRecord(_) => "STORAGE_INVALID_RECORD",
            CollectionError::Corrupt { .. }
            | CollectionError::Io(_)
            | CollectionError::Sql(_)
            | CollectionError::Internal(_) => "STORAGE_FAULT",
        }
    }

    /// Returns true if the collection could not be resolved at all
    pub fn is_unavailable(&self) -> bool {
        self.code() == "STORAGE_COLLECTION_UNAVAILABLE"
    }

    /// Returns true if the caller supplied a bad record
    pub fn is_client_error(&self) -> bool {
        matches!(self, CollectionError::InvalidRecord(_))
    }

    pub(crate) fn unavailable(name: &str, reason: impl ToString) -> Self {
        CollectionError::Unavailable {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn poisoned() -> Self {
        CollectionError::Internal("Lock poisoned".into())
    }
}

impl From<std::io::Error> for CollectionError {
    fn from(err: std::io::Error) -> Self {
        CollectionError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for CollectionError {
    fn from(err: rusqlite::Error) -> Self {
        CollectionError::Sql(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CollectionError {
    fn from(err: tokio::task::JoinError) -> Self {
        CollectionError::Internal(format!("blocking task failed: {}", err))
    }
}
