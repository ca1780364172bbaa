//! Search entry point

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::collection::CollectionRegistry;
use crate::observability::{log_event_with_fields, trace_event, Event};
use crate::query::QueryCondition;

use super::errors::SearchResult;
use super::expose::{ExposeScope, ExposeTransform};
use super::join::JoinStep;
use super::request::SearchRequest;
use super::select::SelectPipeline;

/// Materialized search result
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutput {
    /// `single` was requested; `None` when nothing matched
    One(Option<Value>),
    Many(Vec<Value>),
}

impl SearchOutput {
    /// Number of materialized records
    pub fn len(&self) -> usize {
        match self {
            SearchOutput::One(record) => usize::from(record.is_some()),
            SearchOutput::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The result as one JSON value; `None` for an absent single result
    pub fn into_value(self) -> Option<Value> {
        match self {
            SearchOutput::One(record) => record,
            SearchOutput::Many(records) => Some(Value::Array(records)),
        }
    }
}

impl Serialize for SearchOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SearchOutput::One(record) => record.serialize(serializer),
            SearchOutput::Many(records) => records.serialize(serializer),
        }
    }
}

/// Plans and runs `request`, binding every collection to `tid` when given
///
/// All expressions are compiled and all collections resolved before the
/// driving query runs. Any failure aborts the whole search.
pub async fn execute_search(
    registry: &CollectionRegistry,
    request: &SearchRequest,
    tid: Option<&str>,
) -> SearchResult<SearchOutput> {
    trace_event(Event::SearchBegin, &[("collection", request.name.as_str())]);

    match run(registry, request, tid).await {
        Ok(output) => {
            let count = output.len().to_string();
            log_event_with_fields(
                Event::SearchComplete,
                &[("collection", request.name.as_str()), ("count", &count)],
            );
            Ok(output)
        }
        Err(err) => {
            let message = err.to_string();
            log_event_with_fields(
                Event::SearchFailed,
                &[
                    ("collection", request.name.as_str()),
                    ("code", err.code()),
                    ("error", &message),
                ],
            );
            Err(err)
        }
    }
}

async fn run(
    registry: &CollectionRegistry,
    request: &SearchRequest,
    tid: Option<&str>,
) -> SearchResult<SearchOutput> {
    let source = registry
        .resolve(&request.name, request.collection_type.as_deref(), tid)
        .await?;
    let filter = request.query.clone().map(QueryCondition::parse).transpose()?;
    let expose = request
        .expose_fn
        .as_deref()
        .map(|source| ExposeTransform::compile(ExposeScope::Record, source))
        .transpose()?;

    let mut pipeline = SelectPipeline::from(source).filter(filter).expose(expose);
    for definition in request.joins() {
        pipeline = pipeline.join(JoinStep::plan(registry, definition, tid).await?);
    }

    if request.is_single() {
        Ok(SearchOutput::One(pipeline.to_one().await?))
    } else {
        Ok(SearchOutput::Many(pipeline.to_array().await?))
    }
}
