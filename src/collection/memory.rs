//! Process-local collection

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::query::QueryCondition;

use super::documents::DocumentSet;
use super::errors::{CollectionError, CollectionResult};
use super::{Collection, CollectionType, Record};

/// In-memory ordered collection; contents live as long as the process
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<DocumentSet>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(DocumentSet::new()),
        }
    }

    /// Creates a collection seeded with `records`
    ///
    /// Fails on the first value that is not an object or carries an unusable `_id`.
    pub fn with_records(name: impl Into<String>, records: Vec<Value>) -> CollectionResult<Self> {
        let mut documents = DocumentSet::new();
        for value in records {
            match value {
                Value::Object(record) => {
                    documents.upsert(record)?;
                }
                other => {
                    return Err(CollectionError::InvalidRecord(format!(
                        "expected an object, got {}",
                        other
                    )))
                }
            }
        }
        Ok(Self {
            name: name.into(),
            documents: RwLock::new(documents),
        })
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> CollectionResult<RwLockReadGuard<'_, DocumentSet>> {
        self.documents.read().map_err(|_| CollectionError::poisoned())
    }

    fn write(&self) -> CollectionResult<RwLockWriteGuard<'_, DocumentSet>> {
        self.documents.write().map_err(|_| CollectionError::poisoned())
    }
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CollectionType {
        CollectionType::Memory
    }

    fn search<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Vec<Record>>> {
        async move { Ok(self.read()?.search(condition)) }.boxed()
    }

    fn search_one<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
        async move { Ok(self.read()?.search_one(condition)) }.boxed()
    }

    fn get_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
        async move { Ok(self.read()?.get(id)) }.boxed()
    }

    fn save(&self, records: Vec<Record>) -> BoxFuture<'_, CollectionResult<Vec<Record>>> {
        async move {
            let mut documents = self.write()?;
            records
                .into_iter()
                .map(|record| documents.upsert(record))
                .collect()
        }
        .boxed()
    }

    fn update(&self, records: Vec<Record>) -> BoxFuture<'_, CollectionResult<Vec<Record>>> {
        async move {
            let mut documents = self.write()?;
            let mut updated = Vec::new();
            for partial in records {
                if let Some(record) = documents.merge(partial)? {
                    updated.push(record);
                }
            }
            Ok(updated)
        }
        .boxed()
    }

    fn delete<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Vec<Record>>> {
        async move { Ok(self.write()?.remove_matching(condition)) }.boxed()
    }

    fn delete_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
        async move { Ok(self.write()?.remove(id)) }.boxed()
    }

    fn restore<'a>(
        &'a self,
        id: &'a str,
        record: Option<Record>,
    ) -> BoxFuture<'a, CollectionResult<()>> {
        async move { self.write()?.restore(id, record) }.boxed()
    }
}
