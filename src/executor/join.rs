//! Join resolution
//!
//! Each join picks exactly one strategy when it is planned:
//!
//! 1. `queryFn` present: run the resolve transform with `$` bound to the
//!    driving record and `collection` to the target
//! 2. `queryOne` present: patch it for the record, then `searchOne`
//! 3. `query` present: patch it for the record, then `search`
//! 4. otherwise: fetch the whole target collection
//!
//! Conditions that lose the precedence contest are still compiled, so a
//! malformed placeholder anywhere in the join fails the request up front.

use serde_json::Value;

use crate::collection::{CollectionHandle, CollectionRegistry, Record};
use crate::expression::{Expression, ExpressionScope};
use crate::observability::{trace_event, Event};

use super::errors::{JoinFailure, SearchError, SearchResult};
use super::expose::{expose, ExposeScope, ExposeTransform};
use super::patcher::ConditionTemplate;
use super::request::JoinSpecification;

#[derive(Debug, Clone)]
pub enum JoinStrategy {
    Resolve(Expression),
    One(ConditionTemplate),
    Many(ConditionTemplate),
    All,
}

impl JoinStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            JoinStrategy::Resolve(_) => "resolve",
            JoinStrategy::One(_) => "one",
            JoinStrategy::Many(_) => "many",
            JoinStrategy::All => "all",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinStep {
    name: String,
    target: CollectionHandle,
    strategy: JoinStrategy,
    expose: Option<ExposeTransform>,
}

impl JoinStep {
    pub fn new(
        name: impl Into<String>,
        target: CollectionHandle,
        strategy: JoinStrategy,
        expose: Option<ExposeTransform>,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            strategy,
            expose,
        }
    }

    /// Resolves the target collection and compiles every expression of `definition`
    pub async fn plan(
        registry: &CollectionRegistry,
        definition: &JoinSpecification,
        tid: Option<&str>,
    ) -> SearchResult<Self> {
        let target = registry
            .resolve(&definition.name, definition.collection_type.as_deref(), tid)
            .await?;

        let strategy = match &definition.query_fn {
            Some(source) => {
                JoinStrategy::Resolve(Expression::compile(source, ExpressionScope::Resolver)?)
            }
            None => {
                let one = definition
                    .query_one
                    .clone()
                    .map(ConditionTemplate::compile)
                    .transpose()?;
                let many = definition
                    .query
                    .clone()
                    .map(ConditionTemplate::compile)
                    .transpose()?;
                match (one, many) {
                    (Some(one), _) => JoinStrategy::One(one),
                    (None, Some(many)) => JoinStrategy::Many(many),
                    (None, None) => JoinStrategy::All,
                }
            }
        };

        let expose = definition
            .expose_fn
            .as_deref()
            .map(|source| {
                ExposeTransform::compile(ExposeScope::Join(definition.name.clone()), source)
            })
            .transpose()?;

        Ok(Self::new(definition.name.clone(), target, strategy, expose))
    }

    #[cfg(test)]
    pub(crate) fn strategy(&self) -> &JoinStrategy {
        &self.strategy
    }

    /// Fetches the raw joined value for one driving record
    pub async fn resolve(&self, record: &Value) -> Result<Value, JoinFailure> {
        let value = match &self.strategy {
            JoinStrategy::Resolve(expression) => {
                expression.evaluate_with(record, &self.target).await?
            }
            JoinStrategy::One(template) => {
                let condition = template.materialize(record).await?;
                self.target
                    .search_one(Some(&condition))
                    .await?
                    .map_or(Value::Null, Value::Object)
            }
            JoinStrategy::Many(template) => {
                let condition = template.materialize(record).await?;
                records(self.target.search(Some(&condition)).await?)
            }
            JoinStrategy::All => records(self.target.search(None).await?),
        };
        Ok(value)
    }

    /// Resolves, exposes and attaches this join onto `record`
    pub async fn apply(&self, record: &mut Record) -> SearchResult<()> {
        let driving = Value::Object(record.clone());
        let resolved = self
            .resolve(&driving)
            .await
            .map_err(|e| SearchError::join(&self.name, e))?;
        let exposed = expose(self.expose.as_ref(), resolved)
            .await
            .map_err(|e| SearchError::join(&self.name, e))?;

        let scope = self
            .expose
            .as_ref()
            .map_or_else(|| "none".to_string(), |t| t.scope().to_string());
        trace_event(
            Event::JoinResolved,
            &[
                ("join", self.name.as_str()),
                ("strategy", self.strategy.name()),
                ("expose", scope.as_str()),
            ],
        );
        attach(record, &self.name, exposed);
        Ok(())
    }
}

fn records(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

/// Attaches a joined value to the driving record
///
/// Objects are merged field by field (joined fields win), `null` attaches
/// nothing, and any other value is stored under `name`.
pub fn attach(record: &mut Record, name: &str, value: Value) {
    match value {
        Value::Object(fields) => record.extend(fields),
        Value::Null => {}
        other => {
            record.insert(name.to_string(), other);
        }
    }
}
