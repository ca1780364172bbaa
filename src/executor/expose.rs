//! Expose transforms
//!
//! A transform takes one value and returns the value that replaces it in the
//! output. Record-scope transforms see the whole driving record after every
//! join has attached; join-scope transforms see one join's resolved value.

use std::fmt;

use serde_json::Value;

use crate::expression::{Expression, ExpressionResult, ExpressionScope};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExposeScope {
    Record,
    /// Named after the join's target collection
    Join(String),
}

impl fmt::Display for ExposeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExposeScope::Record => write!(f, "record"),
            ExposeScope::Join(name) => write!(f, "join:{}", name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExposeTransform {
    scope: ExposeScope,
    expression: Expression,
}

impl ExposeTransform {
    pub fn compile(scope: ExposeScope, source: &str) -> ExpressionResult<Self> {
        Ok(Self {
            scope,
            expression: Expression::compile(source, ExpressionScope::Value)?,
        })
    }

    pub fn scope(&self) -> &ExposeScope {
        &self.scope
    }

    pub async fn apply(&self, value: &Value) -> ExpressionResult<Value> {
        self.expression.evaluate(value).await
    }
}

/// Applies `transform` when present; otherwise the value passes through
pub async fn expose(transform: Option<&ExposeTransform>, value: Value) -> ExpressionResult<Value> {
    match transform {
        Some(transform) => transform.apply(&value).await,
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_absent_transform_passes_through() {
        let value = json!({"a": 1});
        assert_eq!(expose(None, value.clone()).await.unwrap(), value);
    }

    #[tokio::test]
    async fn test_transform_replaces_value() {
        let transform =
            ExposeTransform::compile(ExposeScope::Join("test2".into()), "return {test2:$};").unwrap();
        let exposed = expose(Some(&transform), json!([{"_id": "11"}])).await.unwrap();

        assert_eq!(exposed, json!({"test2": [{"_id": "11"}]}));
        assert_eq!(transform.scope(), &ExposeScope::Join("test2".into()));
    }

    #[test]
    fn test_transforms_cannot_reach_collections() {
        assert!(ExposeTransform::compile(ExposeScope::Record, "collection.search()").is_err());
    }

    #[test]
    fn test_scope_labels() {
        assert_eq!(ExposeScope::Record.to_string(), "record");
        assert_eq!(ExposeScope::Join("test2".into()).to_string(), "join:test2");
    }
}
