//! Condition patcher
//!
//! A join condition is kept as an immutable template. Compiling it walks the
//! tree once and records a patch for every string leaf starting with `$`
//! (including strings held directly in arrays). Materializing evaluates each
//! patch against the driving record and writes the results into a fresh copy,
//! so concurrent candidates never share a condition.

use serde_json::Value;

use crate::expression::{Expression, ExpressionScope};
use crate::query::QueryCondition;

use super::errors::{JoinFailure, SearchResult};

/// Marker that turns a string leaf into an expression
pub const PLACEHOLDER_MARKER: char = '$';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// One placeholder leaf: where it sits and what computes it
#[derive(Debug, Clone)]
pub struct Patch {
    path: Vec<PathSegment>,
    expression: Expression,
}

#[cfg(test)]
impl Patch {
    pub(crate) fn path(&self) -> &[PathSegment] {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct ConditionTemplate {
    template: Value,
    patches: Vec<Patch>,
    // Parsed once when there is nothing to patch
    fixed: Option<QueryCondition>,
}

impl ConditionTemplate {
    /// Compiles every placeholder up front
    ///
    /// Fails with an expression error for a malformed placeholder, or a query
    /// error for a placeholder-free condition that is not a valid query.
    pub fn compile(template: Value) -> SearchResult<Self> {
        let mut patches = Vec::new();
        let mut path = Vec::new();
        collect(&template, &mut path, &mut patches)?;

        let fixed = if patches.is_empty() {
            Some(QueryCondition::parse(template.clone())?)
        } else {
            None
        };

        Ok(Self {
            template,
            patches,
            fixed,
        })
    }

    /// Produces the condition for one driving record
    pub async fn materialize(&self, record: &Value) -> Result<QueryCondition, JoinFailure> {
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }

        let mut condition = self.template.clone();
        for patch in &self.patches {
            let value = patch.expression.evaluate(record).await?;
            if let Some(slot) = slot_mut(&mut condition, &patch.path) {
                *slot = value;
            }
        }
        Ok(QueryCondition::parse(condition)?)
    }
}

#[cfg(test)]
impl ConditionTemplate {
    pub(crate) fn template(&self) -> &Value {
        &self.template
    }

    pub(crate) fn patches(&self) -> &[Patch] {
        &self.patches
    }

    /// Returns true if the condition is the same for every driving record
    pub(crate) fn is_static(&self) -> bool {
        self.patches.is_empty()
    }
}

fn collect(value: &Value, path: &mut Vec<PathSegment>, patches: &mut Vec<Patch>) -> SearchResult<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                path.push(PathSegment::Key(key.clone()));
                collect(child, path, patches)?;
                path.pop();
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                path.push(PathSegment::Index(i));
                collect(child, path, patches)?;
                path.pop();
            }
        }
        Value::String(text) if text.starts_with(PLACEHOLDER_MARKER) && !path.is_empty() => {
            patches.push(Patch {
                path: path.clone(),
                expression: Expression::compile(text, ExpressionScope::Value)?,
            });
        }
        _ => {}
    }
    Ok(())
}

fn slot_mut<'a>(root: &'a mut Value, path: &[PathSegment]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in path {
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get_mut(key)?,
            (Value::Array(items), PathSegment::Index(i)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SearchError;
    use crate::expression::ExpressionError;
    use serde_json::json;

    #[test]
    fn test_no_placeholders_is_static() {
        let template = ConditionTemplate::compile(json!({"age": {"$gte": 10}})).unwrap();
        assert!(template.is_static());
        assert!(template.patches().is_empty());
    }

    #[test]
    fn test_collects_nested_placeholders() {
        let template = ConditionTemplate::compile(json!({
            "name": "$.field",
            "$or": [{"age": "$.age"}, {"tags": {"$in": ["x", "$.tag"]}}],
            "literal": "plain"
        }))
        .unwrap();

        let paths: Vec<&[PathSegment]> = template.patches().iter().map(Patch::path).collect();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], &[PathSegment::Key("name".into())][..]);
        assert_eq!(
            paths[2],
            &[
                PathSegment::Key("$or".into()),
                PathSegment::Index(1),
                PathSegment::Key("tags".into()),
                PathSegment::Key("$in".into()),
                PathSegment::Index(1),
            ][..]
        );
    }

    #[test]
    fn test_malformed_placeholder_fails_at_compile() {
        let err = ConditionTemplate::compile(json!({"name": "$.field +"})).unwrap_err();
        assert!(matches!(err, SearchError::Expression(ExpressionError::Syntax { .. })));
    }

    #[tokio::test]
    async fn test_materialize_per_record() {
        let template = ConditionTemplate::compile(json!({"name": "$.field", "age": 10})).unwrap();

        let first = template.materialize(&json!({"field": "a"})).await.unwrap();
        let second = template.materialize(&json!({"field": "b"})).await.unwrap();

        assert_eq!(first.as_value(), &json!({"name": "a", "age": 10}));
        assert_eq!(second.as_value(), &json!({"name": "b", "age": 10}));
        assert_eq!(template.template(), &json!({"name": "$.field", "age": 10}));
    }

    #[tokio::test]
    async fn test_placeholder_can_produce_operand() {
        let template = ConditionTemplate::compile(json!({"age": {"$in": "$.ages"}})).unwrap();
        let condition = template.materialize(&json!({"ages": [1, 2]})).await.unwrap();

        assert!(condition.matches(&json!({"age": 2})));
        assert!(!condition.matches(&json!({"age": 3})));
    }

    #[tokio::test]
    async fn test_placeholder_producing_bad_operand() {
        let template = ConditionTemplate::compile(json!({"age": {"$in": "$.missing"}})).unwrap();
        let err = template.materialize(&json!({})).await.unwrap_err();
        assert!(matches!(err, JoinFailure::Query(_)));
    }
}
