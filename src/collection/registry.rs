//! Collection registry
//!
//! Created once at startup and shared by `Arc`. Caches one collection per
//! (type, name), owns the default collection type and the transaction
//! manager.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, OnceCell};

use crate::observability::{log_event_with_fields, Event};

use super::errors::{CollectionError, CollectionResult};
use super::file::FileCollection;
use super::handle::CollectionHandle;
use super::memory::MemoryCollection;
use super::sql::{open_database, SharedConnection, SqlCollection};
use super::transaction::{TransactionManager, TransactionOutcome};
use super::{Collection, CollectionType};

pub struct CollectionRegistry {
    data_dir: PathBuf,
    default_type: RwLock<CollectionType>,
    collections: Mutex<HashMap<(CollectionType, String), Arc<dyn Collection>>>,
    database: OnceCell<SharedConnection>,
    transactions: Arc<TransactionManager>,
}

impl CollectionRegistry {
    pub fn new(data_dir: impl Into<PathBuf>, default_type: CollectionType) -> Self {
        Self {
            data_dir: data_dir.into(),
            default_type: RwLock::new(default_type),
            collections: Mutex::new(HashMap::new()),
            database: OnceCell::new(),
            transactions: Arc::new(TransactionManager::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Type used when a request does not name one
    pub fn default_type(&self) -> CollectionType {
        match self.default_type.read() {
            Ok(kind) => *kind,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_default_type(&self, kind: CollectionType) {
        match self.default_type.write() {
            Ok(mut current) => *current = kind,
            Err(poisoned) => *poisoned.into_inner() = kind,
        }
        log_event_with_fields(Event::DefaultTypeChanged, &[("type", kind.as_str())]);
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    /// Returns the cached collection, opening it on first use
    pub async fn open(
        &self,
        name: &str,
        kind: Option<CollectionType>,
    ) -> CollectionResult<Arc<dyn Collection>> {
        validate_name(name)?;
        let kind = kind.unwrap_or_else(|| self.default_type());

        let mut collections = self.collections.lock().await;
        if let Some(collection) = collections.get(&(kind, name.to_string())) {
            return Ok(Arc::clone(collection));
        }

        let collection: Arc<dyn Collection> = match kind {
            CollectionType::Memory => Arc::new(MemoryCollection::new(name)),
            CollectionType::File => Arc::new(FileCollection::open(&self.data_dir, name).await?),
            CollectionType::Sql => {
                let conn = self
                    .database
                    .get_or_try_init(|| open_database(&self.data_dir))
                    .await
                    .map_err(|e| CollectionError::unavailable(name, e))?;
                Arc::new(SqlCollection::open(Arc::clone(conn), name).await?)
            }
        };

        collections.insert((kind, name.to_string()), Arc::clone(&collection));
        log_event_with_fields(
            Event::CollectionOpened,
            &[("collection", name), ("type", kind.as_str())],
        );
        Ok(collection)
    }

    /// Resolves a handle, bound to `tid` when one is given
    ///
    /// `kind` is the type name as sent by the caller; an unknown name leaves
    /// the collection unavailable. Binding does not open the transaction, the
    /// first journaled write does.
    pub async fn resolve(
        &self,
        name: &str,
        kind: Option<&str>,
        tid: Option<&str>,
    ) -> CollectionResult<CollectionHandle> {
        let kind = kind.map(str::parse::<CollectionType>).transpose()?;
        let collection = self.open(name, kind).await?;
        match tid {
            Some(tid) => Ok(CollectionHandle::bound(
                collection,
                Arc::clone(&self.transactions),
                tid,
            )),
            None => Ok(CollectionHandle::detached(collection)),
        }
    }

    /// Commits or rolls back `tid`; unknown ids are a no-op
    pub async fn end_transaction(
        &self,
        tid: &str,
        rollback: bool,
    ) -> CollectionResult<TransactionOutcome> {
        self.transactions.end(tid, rollback).await
    }
}

/// Collection names double as file and table names
fn validate_name(name: &str) -> CollectionResult<()> {
    let invalid = name.trim().is_empty()
        || name.contains(&['/', '\\', '\0'][..])
        || name.contains("..");
    if invalid {
        return Err(CollectionError::InvalidName(name.to_string()));
    }
    Ok(())
}
