//! SQLite-backed collection
//!
//! All collections of the `sql` type share one database file,
//! `<data_dir>/storage.sqlite3`, with one table per collection:
//!
//! ```sql
//! CREATE TABLE "<name>" (_id TEXT PRIMARY KEY, body TEXT NOT NULL)
//! ```
//!
//! `body` is the full record as JSON. Records are returned in rowid order and
//! upserts keep their row, so insertion order is preserved. Condition matching
//! happens in process after the rows are decoded. Every statement runs on the
//! blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::query::QueryCondition;

use super::documents::{ensure_id, record_id};
use super::errors::{CollectionError, CollectionResult};
use super::{Collection, CollectionType, Record, ID_FIELD};

/// File name of the shared database inside the data directory
pub const DATABASE_FILE: &str = "storage.sqlite3";

/// Connection shared by every SQL collection of one registry
pub(crate) type SharedConnection = Arc<Mutex<Connection>>;

/// Opens `<data_dir>/storage.sqlite3`, creating the directory if needed
pub(crate) async fn open_database(data_dir: &Path) -> CollectionResult<SharedConnection> {
    let data_dir = data_dir.to_path_buf();
    let conn = tokio::task::spawn_blocking(move || -> CollectionResult<Connection> {
        std::fs::create_dir_all(&data_dir)?;
        Ok(Connection::open(data_dir.join(DATABASE_FILE))?)
    })
    .await??;
    Ok(Arc::new(Mutex::new(conn)))
}

#[derive(Debug)]
pub struct SqlCollection {
    name: String,
    table: String,
    conn: SharedConnection,
}

impl SqlCollection {
    /// Binds `name` to its table, creating the table if it does not exist
    pub(crate) async fn open(conn: SharedConnection, name: &str) -> CollectionResult<Self> {
        let collection = Self {
            name: name.to_string(),
            table: quote_identifier(name),
            conn,
        };
        collection
            .run(|conn, table| {
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {} (_id TEXT PRIMARY KEY, body TEXT NOT NULL)",
                    table
                ))?;
                Ok(())
            })
            .await
            .map_err(|e| CollectionError::unavailable(name, e))?;
        Ok(collection)
    }

    /// Runs `task` against the shared connection on the blocking pool
    async fn run<T, F>(&self, task: F) -> CollectionResult<T>
    where
        F: FnOnce(&mut Connection, &str) -> CollectionResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| CollectionError::poisoned())?;
            task(&mut conn, &table)
        })
        .await?
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn decode(name: &str, body: &str) -> CollectionResult<Record> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(other) => Err(CollectionError::Corrupt {
            name: name.to_string(),
            reason: format!("row body is {}", crate::query::kind_of(&other)),
        }),
        Err(e) => Err(CollectionError::Corrupt {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn encode(record: &Record) -> CollectionResult<String> {
    serde_json::to_string(record).map_err(|e| CollectionError::Internal(e.to_string()))
}

/// Decodes every row in rowid order
fn load_all(conn: &Connection, table: &str) -> CollectionResult<Vec<Record>> {
    let mut stmt = conn.prepare(&format!("SELECT body FROM {} ORDER BY rowid", table))?;
    let bodies = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    bodies.iter().map(|body| decode(table, body)).collect()
}

fn load_one(conn: &Connection, table: &str, id: &str) -> CollectionResult<Option<Record>> {
    let body: Option<String> = conn
        .query_row(
            &format!("SELECT body FROM {} WHERE _id = ?1", table),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|body| decode(table, &body)).transpose()
}

fn upsert(conn: &Connection, table: &str, id: &str, record: &Record) -> CollectionResult<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} (_id, body) VALUES (?1, ?2) \
             ON CONFLICT(_id) DO UPDATE SET body = excluded.body",
            table
        ),
        params![id, encode(record)?],
    )?;
    Ok(())
}

fn remove(conn: &Connection, table: &str, id: &str) -> CollectionResult<()> {
    conn.execute(&format!("DELETE FROM {} WHERE _id = ?1", table), params![id])?;
    Ok(())
}

fn matching(records: Vec<Record>, condition: Option<&QueryCondition>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|record| {
            condition.map_or(true, |c| c.matches(&Value::Object(record.clone())))
        })
        .collect()
}

impl Collection for SqlCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CollectionType {
        CollectionType::Sql
    }

    fn search<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Vec<Record>>> {
        async move {
            let records = self.run(|conn, table| load_all(conn, table)).await?;
            Ok(matching(records, condition))
        }
        .boxed()
    }

    fn get_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
        let id = id.to_string();
        self.run(move |conn, table| load_one(conn, table, &id)).boxed()
    }

    fn save(&self, records: Vec<Record>) -> BoxFuture<'_, CollectionResult<Vec<Record>>> {
        self.run(move |conn, table| {
            let tx = conn.transaction()?;
            let mut saved = Vec::with_capacity(records.len());
            for mut record in records {
                let id = ensure_id(&mut record)?;
                upsert(&tx, table, &id, &record)?;
                saved.push(record);
            }
            tx.commit()?;
            Ok(saved)
        })
        .boxed()
    }

    fn update(&self, records: Vec<Record>) -> BoxFuture<'_, CollectionResult<Vec<Record>>> {
        self.run(move |conn, table| {
            let tx = conn.transaction()?;
            let mut updated = Vec::new();
            for partial in records {
                let Some(id) = record_id(&partial)? else {
                    continue;
                };
                let Some(mut existing) = load_one(&tx, table, &id)? else {
                    continue;
                };
                for (key, value) in partial {
                    if key != ID_FIELD {
                        existing.insert(key, value);
                    }
                }
                upsert(&tx, table, &id, &existing)?;
                updated.push(existing);
            }
            tx.commit()?;
            Ok(updated)
        })
        .boxed()
    }

    fn delete<'a>(
        &'a self,
        condition: Option<&'a QueryCondition>,
    ) -> BoxFuture<'a, CollectionResult<Vec<Record>>> {
        let condition = condition.cloned();
        self.run(move |conn, table| {
            let tx = conn.transaction()?;
            let removed = matching(load_all(&tx, table)?, condition.as_ref());
            for record in &removed {
                if let Some(id) = record_id(record)? {
                    remove(&tx, table, &id)?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .boxed()
    }

    fn delete_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, CollectionResult<Option<Record>>> {
        let id = id.to_string();
        self.run(move |conn, table| {
            let tx = conn.transaction()?;
            let existing = load_one(&tx, table, &id)?;
            if existing.is_some() {
                remove(&tx, table, &id)?;
            }
            tx.commit()?;
            Ok(existing)
        })
        .boxed()
    }

    fn restore<'a>(
        &'a self,
        id: &'a str,
        record: Option<Record>,
    ) -> BoxFuture<'a, CollectionResult<()>> {
        let id = id.to_string();
        self.run(move |conn, table| match record {
            Some(record) => upsert(conn, table, &id, &record),
            None => remove(conn, table, &id),
        })
        .boxed()
    }
}
