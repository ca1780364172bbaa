//! Ordered document set
//!
//! Shared record bookkeeping for the memory and file collections. Records are
//! kept in insertion order; an upsert of an existing `_id` replaces the record
//! in place.

use serde_json::Value;
use uuid::Uuid;

use crate::query::QueryCondition;

use super::errors::{CollectionError, CollectionResult};
use super::{Record, ID_FIELD};

#[derive(Debug, Clone, Default)]
pub(crate) struct DocumentSet {
    // Every entry is a `Value::Object` carrying a string `_id`
    entries: Vec<Value>,
}

impl DocumentSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Builds a set from stored values, rejecting anything that is not a record
    pub(crate) fn from_values(values: Vec<Value>) -> CollectionResult<Self> {
        let mut set = Self::new();
        for value in values {
            match value {
                Value::Object(record) => {
                    set.upsert(record)?;
                }
                other => {
                    return Err(CollectionError::InvalidRecord(format!(
                        "expected an object, got {}",
                        crate::query::kind_of(&other)
                    )))
                }
            }
        }
        Ok(set)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.entries
    }

    pub(crate) fn search(&self, condition: Option<&QueryCondition>) -> Vec<Record> {
        self.entries
            .iter()
            .filter(|entry| QueryCondition::matches_opt(condition, entry))
            .filter_map(as_record)
            .collect()
    }

    pub(crate) fn search_one(&self, condition: Option<&QueryCondition>) -> Option<Record> {
        self.entries
            .iter()
            .find(|entry| QueryCondition::matches_opt(condition, entry))
            .and_then(as_record)
    }

    pub(crate) fn get(&self, id: &str) -> Option<Record> {
        self.position(id).and_then(|i| as_record(&self.entries[i]))
    }

    /// Inserts or replaces by `_id`, returning the stored record
    pub(crate) fn upsert(&mut self, mut record: Record) -> CollectionResult<Record> {
        let id = ensure_id(&mut record)?;
        let stored = record.clone();
        match self.position(&id) {
            Some(i) => self.entries[i] = Value::Object(record),
            None => self.entries.push(Value::Object(record)),
        }
        Ok(stored)
    }

    /// Shallow-merges `partial` into the record with the same `_id`
    ///
    /// Returns `None` when the partial record has no `_id` or no record matches.
    pub(crate) fn merge(&mut self, partial: Record) -> CollectionResult<Option<Record>> {
        let Some(id) = record_id(&partial)? else {
            return Ok(None);
        };
        let Some(i) = self.position(&id) else {
            return Ok(None);
        };
        if let Value::Object(existing) = &mut self.entries[i] {
            for (key, value) in partial {
                if key != ID_FIELD {
                    existing.insert(key, value);
                }
            }
        }
        Ok(as_record(&self.entries[i]))
    }

    /// Removes every matching record, returning them in order
    pub(crate) fn remove_matching(&mut self, condition: Option<&QueryCondition>) -> Vec<Record> {
        let (removed, kept): (Vec<Value>, Vec<Value>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| QueryCondition::matches_opt(condition, entry));
        self.entries = kept;
        removed.iter().filter_map(as_record).collect()
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Record> {
        let i = self.position(id)?;
        as_record(&self.entries.remove(i))
    }

    /// Puts `record` back under `id`, or removes `id` when `record` is absent
    pub(crate) fn restore(&mut self, id: &str, record: Option<Record>) -> CollectionResult<()> {
        match record {
            Some(record) => {
                self.upsert(record)?;
            }
            None => {
                self.remove(id);
            }
        }
        Ok(())
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.get(ID_FIELD).and_then(Value::as_str) == Some(id))
    }
}

fn as_record(value: &Value) -> Option<Record> {
    value.as_object().cloned()
}

/// Reads a record's `_id`; numbers are accepted and read as their decimal text
pub(crate) fn record_id(record: &Record) -> CollectionResult<Option<String>> {
    match record.get(ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) if !id.is_empty() => Ok(Some(id.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(CollectionError::InvalidRecord(format!(
            "'{}' must be a non-empty string, got {}",
            ID_FIELD, other
        ))),
    }
}

/// Normalizes `_id` to a string, generating a UUID when it is missing
pub(crate) fn ensure_id(record: &mut Record) -> CollectionResult<String> {
    let id = record_id(record)?.unwrap_or_else(|| Uuid::new_v4().to_string());
    record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r[ID_FIELD].as_str().unwrap()).collect()
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut set = DocumentSet::new();
        set.upsert(record(json!({"_id": "a", "v": 1}))).unwrap();
        set.upsert(record(json!({"_id": "b", "v": 2}))).unwrap();
        set.upsert(record(json!({"_id": "a", "v": 3}))).unwrap();

        let all = set.search(None);
        assert_eq!(ids(&all), vec!["a", "b"]);
        assert_eq!(all[0]["v"], json!(3));
    }

    #[test]
    fn test_generated_and_numeric_ids() {
        let mut set = DocumentSet::new();
        let generated = set.upsert(record(json!({"v": 1}))).unwrap();
        let numeric = set.upsert(record(json!({"_id": 7}))).unwrap();

        assert_eq!(generated[ID_FIELD].as_str().unwrap().len(), 36);
        assert_eq!(numeric[ID_FIELD], json!("7"));
        assert!(set.get("7").is_some());
        assert!(set.upsert(record(json!({"_id": true}))).is_err());
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut set = DocumentSet::new();
        set.upsert(record(json!({"_id": "a", "name": "x", "nested": {"k": 1}})))
            .unwrap();

        let merged = set
            .merge(record(json!({"_id": "a", "nested": {"j": 2}, "age": 5})))
            .unwrap()
            .unwrap();
        assert_eq!(merged, record(json!({"_id": "a", "name": "x", "nested": {"j": 2}, "age": 5})));

        assert!(set.merge(record(json!({"_id": "zz", "age": 1}))).unwrap().is_none());
        assert!(set.merge(record(json!({"age": 1}))).unwrap().is_none());
    }

    #[test]
    fn test_remove_matching() {
        let mut set = DocumentSet::from_values(vec![
            json!({"_id": "1", "age": 10}),
            json!({"_id": "2", "age": 20}),
            json!({"_id": "3", "age": 30}),
        ])
        .unwrap();

        let condition = QueryCondition::parse(json!({"age": {"$gte": 20}})).unwrap();
        let removed = set.remove_matching(Some(&condition));
        assert_eq!(ids(&removed), vec!["2", "3"]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_restore() {
        let mut set = DocumentSet::new();
        set.upsert(record(json!({"_id": "a"}))).unwrap();

        set.restore("a", None).unwrap();
        assert!(set.get("a").is_none());

        set.restore("b", Some(record(json!({"_id": "b", "v": 1})))).unwrap();
        assert_eq!(set.get("b").unwrap()["v"], json!(1));
    }

    #[test]
    fn test_rejects_non_objects() {
        assert!(DocumentSet::from_values(vec![json!([1])]).is_err());
    }
}
