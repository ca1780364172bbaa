//! Storage HTTP Routes
//!
//! Record CRUD, joined search, default collection type and transaction end.
//! Handlers are thin adapters over the collection registry and the search
//! engine; a `tid` query parameter binds the call to a transaction.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::collection::{CollectionRegistry, CollectionType, Record, TransactionOutcome};
use crate::executor::{execute_search, SearchRequest};
use crate::query::QueryCondition;

use super::errors::ApiResult;

// ==================
// Shared State
// ==================

/// Storage state shared across handlers
pub struct StorageState {
    pub registry: Arc<CollectionRegistry>,
}

impl StorageState {
    pub fn new(registry: Arc<CollectionRegistry>) -> Self {
        Self { registry }
    }
}

// ==================
// Request Types
// ==================

#[derive(Debug, Default, Deserialize)]
pub struct TransactionParams {
    #[serde(default)]
    pub tid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub name: String,
    #[serde(rename = "type", default)]
    pub collection_type: Option<String>,
    pub value: Vec<Record>,
    #[serde(default)]
    pub return_result: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub name: String,
    #[serde(rename = "type", default)]
    pub collection_type: Option<String>,
    pub value: Vec<Record>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub name: String,
    #[serde(rename = "type", default)]
    pub collection_type: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub query: Option<serde_json::Value>,
    #[serde(default)]
    pub return_result: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct GetParams {
    pub name: String,
    #[serde(rename = "type", default)]
    pub collection_type: Option<String>,
    pub id: String,
    #[serde(default)]
    pub tid: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DefaultTypeParams {
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
}

#[derive(Debug, Deserialize)]
pub struct EndTransactionParams {
    pub tid: String,
    #[serde(default)]
    pub rollback: Option<String>,
}

impl EndTransactionParams {
    /// Any value other than empty, `false` or `0` requests a rollback
    pub fn is_rollback(&self) -> bool {
        match self.rollback.as_deref() {
            None => false,
            Some(value) => !matches!(value.trim(), "" | "false" | "0"),
        }
    }
}

// ==================
// Storage Routes
// ==================

/// Create storage routes
pub fn storage_routes(state: Arc<StorageState>) -> Router {
    Router::new()
        // Records
        .route("/save", post(save_handler))
        .route("/update", post(update_handler))
        .route("/delete", post(delete_handler))
        .route("/get", get(get_handler))
        // Joined search
        .route("/search", post(search_handler))
        // Registry and transactions
        .route("/collection/default", post(default_type_handler))
        .route("/transaction/end", post(end_transaction_handler))
        .with_state(state)
}

fn json_or_empty<T: serde::Serialize>(value: Option<T>) -> Response {
    match value {
        Some(value) => Json(value).into_response(),
        None => StatusCode::OK.into_response(),
    }
}

// ==================
// Record Handlers
// ==================

async fn save_handler(
    State(state): State<Arc<StorageState>>,
    params: Result<Query<TransactionParams>, QueryRejection>,
    body: Result<Json<SaveRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let Json(body) = body?;

    let collection = state
        .registry
        .resolve(&body.name, body.collection_type.as_deref(), params.tid.as_deref())
        .await?;
    let saved = collection.save(body.value).await?;

    Ok(json_or_empty(body.return_result.unwrap_or(false).then_some(saved)))
}

async fn update_handler(
    State(state): State<Arc<StorageState>>,
    params: Result<Query<TransactionParams>, QueryRejection>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let Json(body) = body?;

    let collection = state
        .registry
        .resolve(&body.name, body.collection_type.as_deref(), params.tid.as_deref())
        .await?;
    collection.update(body.value).await?;

    Ok(StatusCode::OK.into_response())
}

async fn delete_handler(
    State(state): State<Arc<StorageState>>,
    params: Result<Query<TransactionParams>, QueryRejection>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let Json(body) = body?;

    let collection = state
        .registry
        .resolve(&body.name, body.collection_type.as_deref(), params.tid.as_deref())
        .await?;

    if let Some(id) = &body.id {
        let removed = collection.delete_by_id(id).await?;
        return Ok(json_or_empty(removed));
    }

    if let Some(query) = body.query {
        let condition = QueryCondition::parse(query)?;
        let removed = collection.delete(Some(&condition)).await?;
        return Ok(json_or_empty(body.return_result.unwrap_or(false).then_some(removed)));
    }

    Ok(StatusCode::OK.into_response())
}

async fn get_handler(
    State(state): State<Arc<StorageState>>,
    params: Result<Query<GetParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;

    let collection = state
        .registry
        .resolve(&params.name, params.collection_type.as_deref(), params.tid.as_deref())
        .await?;
    let record = collection.get_by_id(&params.id).await?;

    Ok(json_or_empty(record))
}

// ==================
// Search Handler
// ==================

async fn search_handler(
    State(state): State<Arc<StorageState>>,
    params: Result<Query<TransactionParams>, QueryRejection>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let Json(request) = body?;

    let output = execute_search(&state.registry, &request, params.tid.as_deref()).await?;
    Ok(json_or_empty(output.into_value()))
}

// ==================
// Registry / Transaction Handlers
// ==================

async fn default_type_handler(
    State(state): State<Arc<StorageState>>,
    params: Result<Query<DefaultTypeParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    state.registry.set_default_type(params.collection_type);
    Ok(params.collection_type.as_str().into_response())
}

async fn end_transaction_handler(
    State(state): State<Arc<StorageState>>,
    params: Result<Query<EndTransactionParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let outcome = state
        .registry
        .end_transaction(&params.tid, params.is_rollback())
        .await?;

    let status = match outcome {
        TransactionOutcome::Committed => "committed",
        TransactionOutcome::RolledBack => "rolled_back",
        TransactionOutcome::Unknown => "unknown",
    };
    Ok(status.into_response())
}
