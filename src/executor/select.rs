//! Select pipeline
//!
//! Single-use execution plan: built from a source collection, given a driving
//! filter, joins and a record-scope expose transform, then consumed by
//! [`SelectPipeline::to_array`] or [`SelectPipeline::to_one`].
//!
//! Per candidate: joins run in declared order (later joins see what earlier
//! ones attached), then the record-scope transform. Candidates are processed
//! concurrently and the output keeps the source order.

use futures_util::future::try_join_all;
use serde_json::Value;

use crate::collection::{CollectionHandle, Record};
use crate::query::QueryCondition;

use super::errors::{SearchError, SearchResult};
use super::expose::{expose, ExposeTransform};
use super::join::JoinStep;

pub struct SelectPipeline {
    source: CollectionHandle,
    filter: Option<QueryCondition>,
    joins: Vec<JoinStep>,
    expose: Option<ExposeTransform>,
}

impl SelectPipeline {
    pub fn from(source: CollectionHandle) -> Self {
        Self {
            source,
            filter: None,
            joins: Vec::new(),
            expose: None,
        }
    }

    /// Driving condition; `None` selects every record
    pub fn filter(mut self, condition: Option<QueryCondition>) -> Self {
        self.filter = condition;
        self
    }

    pub fn join(mut self, step: JoinStep) -> Self {
        self.joins.push(step);
        self
    }

    pub fn expose(mut self, transform: Option<ExposeTransform>) -> Self {
        self.expose = transform;
        self
    }

    /// Every candidate, fully processed, in source order
    pub async fn to_array(self) -> SearchResult<Vec<Value>> {
        let candidates = self.source.search(self.filter.as_ref()).await?;
        try_join_all(candidates.into_iter().map(|record| self.process(record))).await
    }

    /// The first candidate, fully processed; `None` when nothing matches
    pub async fn to_one(self) -> SearchResult<Option<Value>> {
        match self.source.search_one(self.filter.as_ref()).await? {
            Some(record) => Ok(Some(self.process(record).await?)),
            None => Ok(None),
        }
    }

    async fn process(&self, mut record: Record) -> SearchResult<Value> {
        for step in &self.joins {
            step.apply(&mut record).await?;
        }
        expose(self.expose.as_ref(), Value::Object(record))
            .await
            .map_err(SearchError::Expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{Collection, MemoryCollection};
    use crate::executor::expose::ExposeScope;
    use crate::executor::join::JoinStrategy;
    use serde_json::json;
    use std::sync::Arc;

    fn handle(name: &str, records: Vec<Value>) -> CollectionHandle {
        let collection: Arc<dyn Collection> = Arc::new(MemoryCollection::with_records(name, records).unwrap());
        CollectionHandle::detached(collection)
    }

    #[tokio::test]
    async fn test_no_joins_returns_source_records() {
        let source = handle("test", vec![json!({"_id": "1", "a": 1}), json!({"_id": "2", "a": 2})]);

        let all = SelectPipeline::from(source.clone()).to_array().await.unwrap();
        assert_eq!(all, vec![json!({"_id": "1", "a": 1}), json!({"_id": "2", "a": 2})]);

        let none = SelectPipeline::from(source)
            .filter(Some(QueryCondition::parse(json!({"a": 3})).unwrap()))
            .to_one()
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_later_joins_see_earlier_attachments() {
        let source = handle("test", vec![json!({"_id": "1"})]);
        let first = JoinStep::new(
            "first",
            handle("first", vec![json!({"_id": "f", "step": 1})]),
            JoinStrategy::All,
            Some(ExposeTransform::compile(ExposeScope::Join("first".into()), "({ step: $[0].step })").unwrap()),
        );
        let second = JoinStep::new(
            "second",
            handle("second", vec![]),
            JoinStrategy::All,
            None,
        );
        let record_expose = ExposeTransform::compile(
            ExposeScope::Record,
            "({ step: $.step, seen: $.second.length })",
        )
        .unwrap();

        let result = SelectPipeline::from(source)
            .join(first)
            .join(second)
            .expose(Some(record_expose))
            .to_array()
            .await
            .unwrap();

        assert_eq!(result, vec![json!({"step": 1, "seen": 0})]);
    }

    #[tokio::test]
    async fn test_one_bad_candidate_fails_everything() {
        let source = handle("test", vec![json!({"_id": "1", "n": 1}), json!({"_id": "2", "n": "x"})]);
        let record_expose = ExposeTransform::compile(ExposeScope::Record, "$.n * 2").unwrap();

        let err = SelectPipeline::from(source)
            .expose(Some(record_expose))
            .to_array()
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Expression(_)));
    }
}
