//! Collection access layer
//!
//! A collection is a named, ordered set of records (JSON objects keyed by a
//! string `_id`). Three backends share one contract:
//!
//! - `memory`: process-local
//! - `file`: one JSON file per collection under the data directory
//! - `sql`: one SQLite table per collection in a shared database file
//!
//! The [`CollectionRegistry`] resolves names to cached collections and hands
//! out [`CollectionHandle`]s, optionally bound to a transaction.

mod documents;
mod errors;
mod file;
mod handle;
mod memory;
mod registry;
mod sql;
mod transaction;

use std::fmt;
use std::str::FromStr;

use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::QueryCondition;

pub use errors::{CollectionError, CollectionResult};
pub use file::FileCollection;
pub use handle::CollectionHandle;
pub use memory::MemoryCollection;
pub use registry::CollectionRegistry;
pub use sql::{SqlCollection, DATABASE_FILE};
pub use transaction::{Transaction, TransactionManager, TransactionOutcome};

/// A stored record; field order is preserved
pub type Record = Map<String, Value>;

/// Identity field of every record
pub const ID_FIELD: &str = "_id";

/// Backend kind of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    Memory,
    File,
    Sql,
}

impl CollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::Memory => "memory",
            CollectionType::File => "file",
            CollectionType::Sql => "sql",
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionType {
    type Err = CollectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(CollectionType::Memory),
            "file" => Ok(CollectionType::File),
            "sql" => Ok(CollectionType::Sql),
            other => Err(CollectionError::UnknownType(other.to_string())),
        }
    }
}

/// Storage contract shared by every backend
///
/// Methods return boxed futures so the trait stays object safe; the registry
/// stores collections as `Arc<dyn Collection>`.
pub trait Collection: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> CollectionType;

    /// All records matching `condition` (every record when absent), in order
    fn search<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Vec<Record>>>;

    /// First record matching `condition`
    fn search_one<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
        async move { Ok(self.search(condition).await?.into_iter().next()) }.boxed()
    }

    fn get_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CollectionResult<Option<Record>>>;

    /// Upserts by `_id`, generating one when missing; returns the stored records
    fn save(&self, records: Vec<Record>) -> BoxFuture<'_, CollectionResult<Vec<Record>>>;

    /// Shallow-merges each partial record into the stored record with its `_id`
    ///
    /// Records without `_id` or with an unknown `_id` are skipped.
    fn update(&self, records: Vec<Record>) -> BoxFuture<'_, CollectionResult<Vec<Record>>>;

    /// Removes every record matching `condition`, returning them
    fn delete<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Vec<Record>>>;

    fn delete_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CollectionResult<Option<Record>>>;

    /// Puts back `record` under `id`, or removes `id` when `record` is absent
    fn restore<'a>(
        &'a self,
        id: &'a str,
        record: Option<Record>,
    ) -> BoxFuture<'a, CollectionResult<()>>;
}
