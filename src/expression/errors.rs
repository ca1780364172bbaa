//! Expression errors
//!
//! Compile errors are raised when a request is planned; evaluation errors are
//! raised while a transform or placeholder runs against a record.

use thiserror::Error;

use crate::collection::CollectionError;
use crate::query::QueryError;

/// Result type for expression compilation and evaluation
pub type ExpressionResult<T> = Result<T, ExpressionError>;

#[derive(Debug, Error)]
pub enum ExpressionError {
    // ==================
    // Compile errors
    // ==================
    /// Malformed source text
    #[error("Syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Identifier other than `$` or `collection`
    #[error("Unknown identifier '{name}' at offset {position}")]
    UnknownIdentifier { name: String, position: usize },

    /// `collection` used in an expression that has no collection bound
    #[error("'collection' is not available here (offset {position})")]
    CollectionNotInScope { position: usize },

    /// `collection.<method>` with an unsupported method
    #[error("Unknown collection method '{name}' at offset {position}")]
    UnknownMethod { name: String, position: usize },

    /// Collection method called with the wrong number of arguments
    #[error("{method} expects {expected} argument(s), got {actual}")]
    Arity {
        method: &'static str,
        expected: &'static str,
        actual: usize,
    },

    // ==================
    // Evaluation errors
    // ==================
    /// Operator applied to operands it does not support
    #[error("Type error: {0}")]
    Type(String),

    /// Condition passed to a collection call is malformed
    #[error("Invalid query condition: {0}")]
    InvalidCondition(#[from] QueryError),

    /// Collection call failed
    #[error("Collection call failed: {0}")]
    Collection(#[from] CollectionError),
}

impl ExpressionError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        "STORAGE_EXPRESSION_ERROR"
    }

    /// Returns true for errors detected before evaluation
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            ExpressionError::Syntax { .. }
                | ExpressionError::UnknownIdentifier { .. }
                | ExpressionError::CollectionNotInScope { .. }
                | ExpressionError::UnknownMethod { .. }
                | ExpressionError::Arity { .. }
        )
    }

    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        ExpressionError::Syntax {
            position,
            message: message.into(),
        }
    }
}
