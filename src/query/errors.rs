//! Query condition errors

use thiserror::Error;

/// Result type for query condition parsing
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while parsing a query condition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// Condition (or a nested `$and`/`$or` element) is not an object
    #[error("Query condition must be an object, got {0}")]
    NotAnObject(&'static str),

    /// Operator key not recognised
    #[error("Unknown query operator: {0}")]
    UnknownOperator(String),

    /// Operator present with an operand of the wrong shape
    #[error("Invalid operand for {operator}: {reason}")]
    InvalidOperand {
        operator: String,
        reason: String,
    },

    /// Field value mixes `$operator` keys with plain keys
    #[error("Field '{0}' mixes operators and plain values")]
    MixedOperators(String),

    /// `$regex` pattern failed to compile
    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },
}

impl QueryError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        "STORAGE_INVALID_QUERY"
    }

    pub(crate) fn operand(operator: &str, reason: impl Into<String>) -> Self {
        QueryError::InvalidOperand {
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }
}
