//! Collection Persistence Tests
//!
//! File and SQL collections must survive a registry restart over the same
//! data directory, keep insertion order, and undo rolled-back writes on disk.

use serde_json::{json, Value};
use tempfile::TempDir;

use backend_storage::collection::{
    CollectionRegistry, CollectionType, Record, TransactionOutcome,
};
use backend_storage::executor::{execute_search, SearchRequest};

fn records(value: Value) -> Vec<Record> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r["_id"].as_str().unwrap()).collect()
}

async fn write_then_reopen(kind: CollectionType) {
    let dir = TempDir::new().unwrap();

    {
        let registry = CollectionRegistry::new(dir.path(), kind);
        let users = registry.resolve("users", None, None).await.unwrap();
        users
            .save(records(json!([
                {"_id": "b", "name": "bea"},
                {"_id": "a", "name": "ada"},
                {"_id": "c", "name": "cy"}
            ])))
            .await
            .unwrap();
        users
            .update(records(json!([{"_id": "a", "role": "admin"}])))
            .await
            .unwrap();
        users.delete_by_id("c").await.unwrap();
    }

    let registry = CollectionRegistry::new(dir.path(), kind);
    let users = registry.resolve("users", None, None).await.unwrap();
    let stored = users.search(None).await.unwrap();

    assert_eq!(ids(&stored), vec!["b", "a"]);
    assert_eq!(stored[1]["role"], "admin");
    assert_eq!(stored[1]["name"], "ada");
}

// =============================================================================
// Restart
// =============================================================================

#[tokio::test]
async fn test_file_collection_survives_restart() {
    write_then_reopen(CollectionType::File).await;
}

#[tokio::test]
async fn test_sql_collection_survives_restart() {
    write_then_reopen(CollectionType::Sql).await;
}

#[tokio::test]
async fn test_file_layout() {
    let dir = TempDir::new().unwrap();
    let registry = CollectionRegistry::new(dir.path(), CollectionType::File);
    registry
        .resolve("orders", None, None)
        .await
        .unwrap()
        .save(records(json!([{"_id": "1", "total": 5}])))
        .await
        .unwrap();

    let content = std::fs::read_to_string(dir.path().join("orders.json")).unwrap();
    let parsed: Value = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed, json!([{"_id": "1", "total": 5}]));
}

#[tokio::test]
async fn test_corrupt_file_is_a_storage_fault() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

    let registry = CollectionRegistry::new(dir.path(), CollectionType::File);
    let err = registry.resolve("broken", None, None).await.unwrap_err();
    assert_eq!(err.code(), "STORAGE_FAULT");
}

// =============================================================================
// Transactions over persistent collections
// =============================================================================

#[tokio::test]
async fn test_rollback_restores_persisted_state() {
    for kind in [CollectionType::File, CollectionType::Sql] {
        let dir = TempDir::new().unwrap();

        {
            let registry = CollectionRegistry::new(dir.path(), kind);
            registry
                .resolve("users", None, None)
                .await
                .unwrap()
                .save(records(json!([{"_id": "a", "name": "ada"}])))
                .await
                .unwrap();

            let bound = registry.resolve("users", None, Some("t1")).await.unwrap();
            bound
                .save(records(json!([{"_id": "b", "name": "bea"}])))
                .await
                .unwrap();
            bound.delete_by_id("a").await.unwrap();

            let outcome = registry.end_transaction("t1", true).await.unwrap();
            assert_eq!(outcome, TransactionOutcome::RolledBack);
        }

        let registry = CollectionRegistry::new(dir.path(), kind);
        let stored = registry
            .resolve("users", None, None)
            .await
            .unwrap()
            .search(None)
            .await
            .unwrap();
        assert_eq!(ids(&stored), vec!["a"], "{} collection", kind);
    }
}

// =============================================================================
// Joins across collection types
// =============================================================================

#[tokio::test]
async fn test_join_across_types() {
    let dir = TempDir::new().unwrap();
    let registry = CollectionRegistry::new(dir.path(), CollectionType::Memory);

    registry
        .resolve("people", Some("sql"), None)
        .await
        .unwrap()
        .save(records(json!([{"_id": "p1", "name": "ada"}])))
        .await
        .unwrap();
    registry
        .resolve("pets", Some("file"), None)
        .await
        .unwrap()
        .save(records(json!([
            {"_id": "x", "owner": "p1", "kind": "cat"},
            {"_id": "y", "owner": "p2", "kind": "dog"}
        ])))
        .await
        .unwrap();

    let request: SearchRequest = serde_json::from_value(json!({
        "name": "people",
        "type": "sql",
        "single": true,
        "join": [{"name": "pets", "type": "file", "query": {"owner": "$._id"}}]
    }))
    .unwrap();

    let result = execute_search(&registry, &request, None)
        .await
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(
        result,
        json!({"_id": "p1", "name": "ada", "pets": [{"_id": "x", "owner": "p1", "kind": "cat"}]})
    );
}
