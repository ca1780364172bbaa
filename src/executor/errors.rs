//! Search error types
//!
//! Error codes:
//! - STORAGE_EXPRESSION_ERROR: a placeholder or transform failed to compile,
//!   or the record-scope expose transform failed
//! - STORAGE_INVALID_QUERY: the driving condition is malformed
//! - STORAGE_JOIN_RESOLUTION: a join's fetch, resolve transform or expose
//!   transform failed for some driving record
//! - STORAGE_COLLECTION_UNAVAILABLE: a collection could not be resolved
//! - STORAGE_FAULT: the underlying store failed
//!
//! Every error is fatal to the whole search; no partial result is returned.

use thiserror::Error;

use crate::collection::CollectionError;
use crate::expression::ExpressionError;
use crate::query::QueryError;

/// Result type for search execution
pub type SearchResult<T> = Result<T, SearchError>;

/// Why one join failed for one driving record
#[derive(Debug, Error)]
pub enum JoinFailure {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// The patched condition is not a valid query
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Collection(#[from] CollectionError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("Join '{join}' failed: {source}")]
    JoinResolution {
        join: String,
        #[source]
        source: JoinFailure,
    },

    #[error("{0}")]
    CollectionUnavailable(CollectionError),

    #[error("Storage error: {0}")]
    Collection(CollectionError),
}

impl SearchError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::Expression(e) => e.code(),
            SearchError::InvalidQuery(e) => e.code(),
            SearchError::JoinResolution { .. } => "STORAGE_JOIN_RESOLUTION",
            SearchError::CollectionUnavailable(_) => "STORAGE_COLLECTION_UNAVAILABLE",
            SearchError::Collection(e) => e.code(),
        }
    }

    pub(crate) fn join(join: &str, source: impl Into<JoinFailure>) -> Self {
        SearchError::JoinResolution {
            join: join.to_string(),
            source: source.into(),
        }
    }
}

impl From<CollectionError> for SearchError {
    fn from(err: CollectionError) -> Self {
        if err.is_unavailable() {
            SearchError::CollectionUnavailable(err)
        } else {
            SearchError::Collection(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_errors_are_split() {
        let unavailable: SearchError = CollectionError::InvalidName("a/b".into()).into();
        assert!(matches!(unavailable, SearchError::CollectionUnavailable(_)));
        assert_eq!(unavailable.code(), "STORAGE_COLLECTION_UNAVAILABLE");

        let fault: SearchError = CollectionError::Sql("disk I/O error".into()).into();
        assert_eq!(fault.code(), "STORAGE_FAULT");
    }

    #[test]
    fn test_join_error_names_the_join() {
        let err = SearchError::join("orders", ExpressionError::Type("bad".into()));
        assert_eq!(err.code(), "STORAGE_JOIN_RESOLUTION");
        assert!(err.to_string().contains("orders"));
    }
}
