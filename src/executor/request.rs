//! Search request wire types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A search against one collection, with optional joins
///
/// ```json
/// {"name": "test", "type": "memory", "query": {"age": 10},
///  "exposeFn": "return { age: $.age };", "single": false,
///  "join": [{"name": "test2", "queryOne": {"name": "$.field"}}]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub collection_type: Option<String>,

    /// Driving condition; absent matches every record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,

    /// Record-scope expose transform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_fn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<Vec<JoinSpecification>>,
}

impl SearchRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn is_single(&self) -> bool {
        self.single.unwrap_or(false)
    }

    /// Joins in declared order
    pub fn joins(&self) -> &[JoinSpecification] {
        self.join.as_deref().unwrap_or(&[])
    }
}

/// One join; resolution precedence is `queryFn` > `queryOne` > `query` > full fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpecification {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub collection_type: Option<String>,

    /// Multi-match condition; `$`-prefixed string leaves are placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,

    /// Single-match condition; `$`-prefixed string leaves are placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_one: Option<Value>,

    /// Resolve transform; `$` is the driving record, `collection` the join target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_fn: Option<String>,

    /// Join-scope expose transform; `$` is the resolved value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_fn: Option<String>,
}

impl JoinSpecification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
