//! Collection handle
//!
//! What the registry hands out: a collection plus, optionally, the transaction
//! its writes belong to. Reads go straight to the collection. Writes made
//! through a bound handle journal the prior state of each touched record
//! first, so the transaction can be rolled back.

use std::fmt;
use std::sync::Arc;

use crate::query::QueryCondition;

use super::documents::{ensure_id, record_id};
use super::errors::CollectionResult;
use super::transaction::{TransactionManager, UndoEntry};
use super::{Collection, CollectionType, Record};

#[derive(Clone)]
struct Binding {
    manager: Arc<TransactionManager>,
    tid: String,
}

#[derive(Clone)]
pub struct CollectionHandle {
    collection: Arc<dyn Collection>,
    binding: Option<Binding>,
}

impl CollectionHandle {
    /// A handle outside any transaction
    pub fn detached(collection: Arc<dyn Collection>) -> Self {
        Self {
            collection,
            binding: None,
        }
    }

    pub(crate) fn bound(
        collection: Arc<dyn Collection>,
        manager: Arc<TransactionManager>,
        tid: &str,
    ) -> Self {
        Self {
            collection,
            binding: Some(Binding {
                manager,
                tid: tid.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.collection.name()
    }

    pub fn kind(&self) -> CollectionType {
        self.collection.kind()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.tid.as_str())
    }

    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.collection
    }

    pub async fn search(&self, condition: Option<&QueryCondition>) -> CollectionResult<Vec<Record>> {
        self.collection.search(condition).await
    }

    pub async fn search_one(
        &self,
        condition: Option<&QueryCondition>,
    ) -> CollectionResult<Option<Record>> {
        self.collection.search_one(condition).await
    }

    pub async fn get_by_id(&self, id: &str) -> CollectionResult<Option<Record>> {
        self.collection.get_by_id(id).await
    }

    /// Upserts `records`, returning them as stored
    pub async fn save(&self, mut records: Vec<Record>) -> CollectionResult<Vec<Record>> {
        if let Some(binding) = &self.binding {
            let mut undo = Vec::with_capacity(records.len());
            for record in &mut records {
                let id = ensure_id(record)?;
                let prior = self.collection.get_by_id(&id).await?;
                undo.push(self.undo_entry(id, prior));
            }
            binding.manager.journal(&binding.tid, undo)?;
        }
        self.collection.save(records).await
    }

    /// Merges partial records into existing ones by `_id`
    pub async fn update(&self, records: Vec<Record>) -> CollectionResult<Vec<Record>> {
        if let Some(binding) = &self.binding {
            let mut undo = Vec::new();
            for record in &records {
                let Some(id) = record_id(record)? else {
                    continue;
                };
                if let Some(prior) = self.collection.get_by_id(&id).await? {
                    undo.push(self.undo_entry(id, Some(prior)));
                }
            }
            binding.manager.journal(&binding.tid, undo)?;
        }
        self.collection.update(records).await
    }

    pub async fn delete(&self, condition: Option<&QueryCondition>) -> CollectionResult<Vec<Record>> {
        let removed = self.collection.delete(condition).await?;
        self.journal_removed(&removed)?;
        Ok(removed)
    }

    pub async fn delete_by_id(&self, id: &str) -> CollectionResult<Option<Record>> {
        let removed = self.collection.delete_by_id(id).await?;
        if let Some(record) = &removed {
            self.journal_removed(std::slice::from_ref(record))?;
        }
        Ok(removed)
    }

    fn journal_removed(&self, removed: &[Record]) -> CollectionResult<()> {
        let Some(binding) = &self.binding else {
            return Ok(());
        };
        let mut undo = Vec::with_capacity(removed.len());
        for record in removed {
            if let Some(id) = record_id(record)? {
                undo.push(self.undo_entry(id, Some(record.clone())));
            }
        }
        binding.manager.journal(&binding.tid, undo)
    }

    fn undo_entry(&self, id: String, prior: Option<Record>) -> UndoEntry {
        UndoEntry {
            collection: Arc::clone(&self.collection),
            id,
            prior,
        }
    }
}

impl fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("tid", &self.transaction_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemoryCollection;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_bound_writes_roll_back() {
        let collection: Arc<dyn Collection> = Arc::new(MemoryCollection::with_records(
            "users",
            vec![json!({"_id": "1", "age": 10}), json!({"_id": "2", "age": 20})],
        )
        .unwrap());
        let manager = Arc::new(TransactionManager::new());
        let handle = CollectionHandle::bound(Arc::clone(&collection), Arc::clone(&manager), "t");

        handle.save(vec![record(json!({"_id": "3"}))]).await.unwrap();
        handle.update(vec![record(json!({"_id": "1", "age": 11}))]).await.unwrap();
        handle.delete_by_id("2").await.unwrap();
        assert_eq!(handle.search(None).await.unwrap().len(), 2);

        manager.end("t", true).await.unwrap();

        let after = collection.search(None).await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(
            collection.get_by_id("1").await.unwrap().unwrap()["age"],
            json!(10)
        );
        assert!(collection.get_by_id("2").await.unwrap().is_some());
        assert!(collection.get_by_id("3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_detached_writes_are_not_journaled() {
        let collection: Arc<dyn Collection> = Arc::new(MemoryCollection::new("users"));
        let handle = CollectionHandle::detached(collection);

        let saved = handle.save(vec![record(json!({"name": "a"}))]).await.unwrap();
        assert!(saved[0].contains_key("_id"));
        assert!(handle.transaction_id().is_none());
    }
}
