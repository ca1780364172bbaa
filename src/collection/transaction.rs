//! Transaction lifecycle
//!
//! A transaction id opens implicitly the first time a write is journaled under
//! it; reads never open one. Writes journal the prior state of every touched
//! record; committing drops the journal and rolling back replays it
//! newest-first. Isolation between concurrent transactions is not provided.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::observability::{log_event_with_fields, Event};

use super::errors::{CollectionError, CollectionResult};
use super::{Collection, Record};

/// Prior state of one record touched inside a transaction
pub(crate) struct UndoEntry {
    pub collection: Arc<dyn Collection>,
    pub id: String,
    /// `None` if the record did not exist before the write
    pub prior: Option<Record>,
}

pub struct Transaction {
    id: String,
    started_at: DateTime<Utc>,
    journal: Vec<UndoEntry>,
}

impl Transaction {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            started_at: Utc::now(),
            journal: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Number of journaled writes
    pub fn len(&self) -> usize {
        self.journal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.journal.is_empty()
    }
}

/// How a transaction was ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed,
    RolledBack,
    /// The id was never used (or already ended)
    Unknown,
}

#[derive(Default)]
pub struct TransactionManager {
    open: Mutex<HashMap<String, Transaction>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> CollectionResult<MutexGuard<'_, HashMap<String, Transaction>>> {
        self.open.lock().map_err(|_| CollectionError::poisoned())
    }

    pub fn is_open(&self, tid: &str) -> bool {
        self.lock().map(|open| open.contains_key(tid)).unwrap_or(false)
    }

    /// Number of journaled writes for `tid`, if it is open
    pub fn pending_writes(&self, tid: &str) -> Option<usize> {
        self.lock().ok()?.get(tid).map(Transaction::len)
    }

    /// Appends undo entries to `tid`, opening it if needed
    pub(crate) fn journal(&self, tid: &str, entries: Vec<UndoEntry>) -> CollectionResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut open = self.lock()?;
        let transaction = open.entry(tid.to_string()).or_insert_with(|| {
            log_event_with_fields(Event::TransactionBegin, &[("tid", tid)]);
            Transaction::new(tid)
        });
        transaction.journal.extend(entries);
        Ok(())
    }

    /// Commits or rolls back `tid`
    ///
    /// Rollback restores every journaled record newest-first. Entries whose
    /// restore fails stay journaled under `tid` so ending it again retries them,
    /// unless an older entry for the same record was restored.
    pub async fn end(&self, tid: &str, rollback: bool) -> CollectionResult<TransactionOutcome> {
        let removed = self.lock()?.remove(tid);
        let Some(transaction) = removed else {
            return Ok(TransactionOutcome::Unknown);
        };
        let writes = transaction.len().to_string();

        if !rollback {
            log_event_with_fields(Event::TransactionCommit, &[("tid", tid), ("writes", &writes)]);
            return Ok(TransactionOutcome::Committed);
        }

        let mut replayed = Vec::with_capacity(transaction.journal.len());
        for entry in transaction.journal.into_iter().rev() {
            let result = entry.collection.restore(&entry.id, entry.prior.clone()).await;
            replayed.push((entry, result));
        }

        // Oldest first from here on
        let mut restored: Vec<(Arc<dyn Collection>, String)> = Vec::new();
        let mut unreplayed = Vec::new();
        let mut failure = None;
        while let Some((entry, result)) = replayed.pop() {
            match result {
                Ok(()) => restored.push((Arc::clone(&entry.collection), entry.id)),
                Err(err) => {
                    let superseded = restored
                        .iter()
                        .any(|(c, id)| Arc::ptr_eq(c, &entry.collection) && *id == entry.id);
                    if !superseded {
                        failure = Some(err);
                        unreplayed.push(entry);
                    }
                }
            }
        }

        if let Some(err) = failure {
            let remaining = unreplayed.len().to_string();
            let mut open = self.lock()?;
            let transaction = open
                .entry(tid.to_string())
                .or_insert_with(|| Transaction::new(tid));
            transaction.journal.splice(0..0, unreplayed);
            log_event_with_fields(
                Event::TransactionRollbackFailed,
                &[("tid", tid), ("remaining", &remaining), ("error", &err.to_string())],
            );
            return Err(err);
        }

        log_event_with_fields(Event::TransactionRollback, &[("tid", tid), ("writes", &writes)]);
        Ok(TransactionOutcome::RolledBack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{CollectionType, MemoryCollection};
    use crate::query::QueryCondition;
    use futures_util::future::{BoxFuture, FutureExt};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory collection whose next `failures` restores of one id fail
    #[derive(Debug)]
    struct FlakyRestore {
        inner: MemoryCollection,
        broken_id: &'static str,
        failures: AtomicUsize,
    }

    impl FlakyRestore {
        fn new(broken_id: &'static str, failures: usize) -> Self {
            Self {
                inner: MemoryCollection::new("flaky"),
                broken_id,
                failures: AtomicUsize::new(failures),
            }
        }
    }

    impl Collection for FlakyRestore {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn kind(&self) -> CollectionType {
            self.inner.kind()
        }

        fn search<'a>(
            &'a self,
            condition: Option<&'a QueryCondition>,
        ) -> BoxFuture<'a, CollectionResult<Vec<Record>>> {
            self.inner.search(condition)
        }

        fn get_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
            self.inner.get_by_id(id)
        }

        fn save(&self, records: Vec<Record>) -> BoxFuture<'_, CollectionResult<Vec<Record>>> {
            self.inner.save(records)
        }

        fn update(&self, records: Vec<Record>) -> BoxFuture<'_, CollectionResult<Vec<Record>>> {
            self.inner.update(records)
        }

        fn delete<'a>(
            &'a self,
            condition: Option<&'a QueryCondition>,
        ) -> BoxFuture<'a, CollectionResult<Vec<Record>>> {
            self.inner.delete(condition)
        }

        fn delete_by_id<'a>(
            &'a self,
            id: &'a str,
        ) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
            self.inner.delete_by_id(id)
        }

        fn restore<'a>(
            &'a self,
            id: &'a str,
            record: Option<Record>,
        ) -> BoxFuture<'a, CollectionResult<()>> {
            let failing = id == self.broken_id
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if failing {
                return async { Err(CollectionError::Io("disk unavailable".into())) }.boxed();
            }
            self.inner.restore(id, record)
        }
    }

    fn undo(collection: &Arc<dyn Collection>, id: &str, prior: Option<serde_json::Value>) -> UndoEntry {
        UndoEntry {
            collection: Arc::clone(collection),
            id: id.into(),
            prior: prior.map(record),
        }
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_unknown_tid_is_noop() {
        let manager = TransactionManager::new();
        assert_eq!(manager.end("nope", true).await.unwrap(), TransactionOutcome::Unknown);
    }

    #[tokio::test]
    async fn test_rollback_replays_newest_first() {
        let users: Arc<dyn Collection> =
            Arc::new(MemoryCollection::with_records("users", vec![json!({"_id": "1", "v": 0})]).unwrap());
        let manager = TransactionManager::new();

        // v: 0 -> 1 -> 2, then a new record "2"
        manager
            .journal(
                "t1",
                vec![UndoEntry {
                    collection: Arc::clone(&users),
                    id: "1".into(),
                    prior: Some(record(json!({"_id": "1", "v": 0}))),
                }],
            )
            .unwrap();
        manager
            .journal(
                "t1",
                vec![
                    UndoEntry {
                        collection: Arc::clone(&users),
                        id: "1".into(),
                        prior: Some(record(json!({"_id": "1", "v": 1}))),
                    },
                    UndoEntry {
                        collection: Arc::clone(&users),
                        id: "2".into(),
                        prior: None,
                    },
                ],
            )
            .unwrap();
        users
            .save(vec![record(json!({"_id": "1", "v": 2})), record(json!({"_id": "2"}))])
            .await
            .unwrap();
        assert_eq!(manager.pending_writes("t1"), Some(3));

        let outcome = manager.end("t1", true).await.unwrap();
        assert_eq!(outcome, TransactionOutcome::RolledBack);
        assert_eq!(users.get_by_id("1").await.unwrap().unwrap()["v"], json!(0));
        assert!(users.get_by_id("2").await.unwrap().is_none());
        assert!(!manager.is_open("t1"));
    }

    #[tokio::test]
    async fn test_commit_closes() {
        let users: Arc<dyn Collection> = Arc::new(MemoryCollection::new("users"));
        let manager = TransactionManager::new();

        manager.journal("t2", vec![]).unwrap();
        assert!(!manager.is_open("t2"));

        manager.journal("t2", vec![undo(&users, "1", None)]).unwrap();
        assert!(manager.is_open("t2"));
        assert_eq!(manager.end("t2", false).await.unwrap(), TransactionOutcome::Committed);
        assert!(!manager.is_open("t2"));
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_remaining_entries() {
        let collection: Arc<dyn Collection> = Arc::new(FlakyRestore::new("b", 1));
        let manager = TransactionManager::new();

        // a and c were inserted, b was overwritten
        manager
            .journal(
                "t3",
                vec![
                    undo(&collection, "a", None),
                    undo(&collection, "b", Some(json!({"_id": "b", "v": 0}))),
                    undo(&collection, "c", None),
                ],
            )
            .unwrap();
        collection
            .save(vec![
                record(json!({"_id": "a"})),
                record(json!({"_id": "b", "v": 1})),
                record(json!({"_id": "c"})),
            ])
            .await
            .unwrap();

        let err = manager.end("t3", true).await.unwrap_err();
        assert_eq!(err.code(), "STORAGE_FAULT");

        // Entries on either side of the failure were still restored
        assert!(collection.get_by_id("a").await.unwrap().is_none());
        assert!(collection.get_by_id("c").await.unwrap().is_none());
        assert_eq!(collection.get_by_id("b").await.unwrap().unwrap()["v"], json!(1));
        assert_eq!(manager.pending_writes("t3"), Some(1));

        assert_eq!(manager.end("t3", true).await.unwrap(), TransactionOutcome::RolledBack);
        assert_eq!(collection.get_by_id("b").await.unwrap().unwrap()["v"], json!(0));
        assert!(!manager.is_open("t3"));
    }

    #[tokio::test]
    async fn test_failed_restore_superseded_by_older_entry() {
        let collection: Arc<dyn Collection> = Arc::new(FlakyRestore::new("b", 1));
        let manager = TransactionManager::new();

        // v: 0 -> 1 -> 2; restoring v=1 fails, restoring v=0 succeeds
        manager
            .journal(
                "t4",
                vec![
                    undo(&collection, "b", Some(json!({"_id": "b", "v": 0}))),
                    undo(&collection, "b", Some(json!({"_id": "b", "v": 1}))),
                ],
            )
            .unwrap();
        collection
            .save(vec![record(json!({"_id": "b", "v": 2}))])
            .await
            .unwrap();

        assert_eq!(manager.end("t4", true).await.unwrap(), TransactionOutcome::RolledBack);
        assert_eq!(collection.get_by_id("b").await.unwrap().unwrap()["v"], json!(0));
        assert!(!manager.is_open("t4"));
    }
}
