//! JSON-file collection
//!
//! One file per collection at `<data_dir>/<name>.json` holding a JSON array of
//! records. The file is loaded when the collection is opened and rewritten
//! after every write: data goes to `<name>.json.tmp`, is fsynced, then renamed
//! over the live file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::query::QueryCondition;

use super::documents::DocumentSet;
use super::errors::{CollectionError, CollectionResult};
use super::{Collection, CollectionType, Record};

#[derive(Debug)]
pub struct FileCollection {
    name: String,
    path: PathBuf,
    documents: Mutex<DocumentSet>,
}

impl FileCollection {
    /// Opens (or creates on first write) the collection stored under `data_dir`
    pub async fn open(data_dir: &Path, name: &str) -> CollectionResult<Self> {
        let path = data_dir.join(format!("{}.json", name));
        let load_path = path.clone();
        let collection = name.to_string();

        let documents = tokio::task::spawn_blocking(move || load(&load_path, &collection))
            .await?
            .map_err(|e| match e {
                CollectionError::Io(reason) => CollectionError::unavailable(name, reason),
                other => other,
            })?;

        Ok(Self {
            name: name.to_string(),
            path,
            documents: Mutex::new(documents),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the set, persists it, then publishes it
    async fn write_with<T, F>(&self, change: F) -> CollectionResult<T>
    where
        F: FnOnce(&mut DocumentSet) -> CollectionResult<T> + Send,
        T: Send,
    {
        let mut documents = self.documents.lock().await;
        let mut next = documents.clone();
        let result = change(&mut next)?;

        let bytes = serde_json::to_vec_pretty(next.values())
            .map_err(|e| CollectionError::Internal(e.to_string()))?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || persist(&path, &bytes)).await??;

        *documents = next;
        Ok(result)
    }
}

fn load(path: &Path, name: &str) -> CollectionResult<DocumentSet> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(DocumentSet::new()),
        Err(e) => return Err(e.into()),
    };

    let values: Vec<Value> =
        serde_json::from_slice(&content).map_err(|e| CollectionError::Corrupt {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

    DocumentSet::from_values(values).map_err(|e| CollectionError::Corrupt {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn persist(path: &Path, bytes: &[u8]) -> CollectionResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    let mut file = File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)?;
    Ok(())
}

impl Collection for FileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CollectionType {
        CollectionType::File
    }

    fn search<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Vec<Record>>> {
        async move { Ok(self.documents.lock().await.search(condition)) }.boxed()
    }

    fn search_one<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
        async move { Ok(self.documents.lock().await.search_one(condition)) }.boxed()
    }

    fn get_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
        async move { Ok(self.documents.lock().await.get(id)) }.boxed()
    }

    fn save(&self, records: Vec<Record>) -> BoxFuture<'_, CollectionResult<Vec<Record>>> {
        self.write_with(move |documents| {
            records
                .into_iter()
                .map(|record| documents.upsert(record))
                .collect()
        })
        .boxed()
    }

    fn update(&self, records: Vec<Record>) -> BoxFuture<'_, CollectionResult<Vec<Record>>> {
        self.write_with(move |documents| {
            let mut updated = Vec::new();
            for partial in records {
                if let Some(record) = documents.merge(partial)? {
                    updated.push(record);
                }
            }
            Ok(updated)
        })
        .boxed()
    }

    fn delete<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Vec<Record>>> {
        self.write_with(move |documents| Ok(documents.remove_matching(condition)))
            .boxed()
    }

    fn delete_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
        self.write_with(move |documents| Ok(documents.remove(id)))
            .boxed()
    }

    fn restore<'a>(
        &'a self,
        id: &'a str,
        record: Option<Record>,
    ) -> BoxFuture<'a, CollectionResult<()>> {
        self.write_with(move |documents| documents.restore(id, record))
            .boxed()
    }
}
