//! Query conditions over JSON records
//!
//! A condition is a JSON object. Keys are field paths (`address.city`,
//! `tags.0`) or the logical operators `$and`, `$or` and `$nor`. A field's
//! value is either a literal (deep equality) or an operator object whose keys
//! all start with `$`.
//!
//! Matching never coerces types: `"10"` does not equal `10`, and ordering
//! operators only compare numbers with numbers and strings with strings.

use std::cmp::Ordering;

use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::errors::{QueryError, QueryResult};

/// A parsed, validated query condition
#[derive(Debug, Clone)]
pub struct QueryCondition {
    raw: Value,
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
enum Clause {
    And(Vec<QueryCondition>),
    Or(Vec<QueryCondition>),
    Nor(Vec<QueryCondition>),
    Field { path: Vec<String>, ops: Vec<FieldOp> },
}

#[derive(Debug, Clone)]
enum FieldOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Size(usize),
    Not(Vec<FieldOp>),
}

impl QueryCondition {
    /// Parses a condition, validating every operator up front
    pub fn parse(raw: Value) -> QueryResult<Self> {
        let clauses = match &raw {
            Value::Object(map) => parse_clauses(map)?,
            other => return Err(QueryError::NotAnObject(kind_of(other))),
        };
        Ok(Self { raw, clauses })
    }

    /// A condition matching every record
    pub fn match_all() -> Self {
        Self {
            raw: Value::Object(Map::new()),
            clauses: Vec::new(),
        }
    }

    /// The condition as it was supplied
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// Returns true if the condition has no clauses
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Checks if a record matches every clause (AND semantics)
    pub fn matches(&self, record: &Value) -> bool {
        self.clauses.iter().all(|clause| clause.matches(record))
    }

    /// `matches` for an optional condition; absent matches everything
    pub fn matches_opt(condition: Option<&QueryCondition>, record: &Value) -> bool {
        condition.map_or(true, |c| c.matches(record))
    }
}

impl Serialize for QueryCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl Clause {
    fn matches(&self, record: &Value) -> bool {
        match self {
            Clause::And(conds) => conds.iter().all(|c| c.matches(record)),
            Clause::Or(conds) => conds.iter().any(|c| c.matches(record)),
            Clause::Nor(conds) => !conds.iter().any(|c| c.matches(record)),
            Clause::Field { path, ops } => {
                let actual = lookup_path(record, path);
                ops.iter().all(|op| op.matches(actual))
            }
        }
    }
}

impl FieldOp {
    fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            FieldOp::Eq(expected) => eq_match(actual, expected),
            FieldOp::Ne(expected) => !eq_match(actual, expected),
            FieldOp::Gt(bound) => ordering(actual, bound) == Some(Ordering::Greater),
            FieldOp::Gte(bound) => matches!(
                ordering(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FieldOp::Lt(bound) => ordering(actual, bound) == Some(Ordering::Less),
            FieldOp::Lte(bound) => matches!(
                ordering(actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FieldOp::In(values) => values.iter().any(|v| eq_match(actual, v)),
            FieldOp::Nin(values) => !values.iter().any(|v| eq_match(actual, v)),
            FieldOp::Exists(expected) => actual.is_some() == *expected,
            FieldOp::Regex(re) => actual
                .and_then(Value::as_str)
                .map_or(false, |s| re.is_match(s)),
            FieldOp::Size(len) => actual
                .and_then(Value::as_array)
                .map_or(false, |a| a.len() == *len),
            FieldOp::Not(ops) => !ops.iter().all(|op| op.matches(actual)),
        }
    }
}

/// Exact equality; an array field also matches when it contains a scalar
fn eq_match(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(value) if value == expected => true,
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(_) => false,
    }
}

fn ordering(actual: Option<&Value>, bound: &Value) -> Option<Ordering> {
    match (actual?, bound) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                return Some(ai.cmp(&bi));
            }
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Resolves a dotted path; numeric segments index into arrays
fn lookup_path<'a>(record: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = record;
    for segment in path {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn parse_clauses(map: &Map<String, Value>) -> QueryResult<Vec<Clause>> {
    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        let clause = match key.as_str() {
            "$and" => Clause::And(parse_condition_list(key, value)?),
            "$or" => Clause::Or(parse_condition_list(key, value)?),
            "$nor" => Clause::Nor(parse_condition_list(key, value)?),
            op if op.starts_with('$') => return Err(QueryError::UnknownOperator(op.to_string())),
            field => Clause::Field {
                path: field.split('.').map(str::to_string).collect(),
                ops: parse_field_value(field, value)?,
            },
        };
        clauses.push(clause);
    }
    Ok(clauses)
}

fn parse_condition_list(operator: &str, value: &Value) -> QueryResult<Vec<QueryCondition>> {
    let items = value
        .as_array()
        .ok_or_else(|| QueryError::operand(operator, "expected an array of conditions"))?;
    items
        .iter()
        .map(|item| QueryCondition::parse(item.clone()))
        .collect()
}

fn parse_field_value(field: &str, value: &Value) -> QueryResult<Vec<FieldOp>> {
    let map = match value {
        Value::Object(map) if !map.is_empty() => map,
        other => return Ok(vec![FieldOp::Eq(other.clone())]),
    };

    let operator_keys = map.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 {
        return Ok(vec![FieldOp::Eq(value.clone())]);
    }
    if operator_keys != map.len() {
        return Err(QueryError::MixedOperators(field.to_string()));
    }
    parse_operators(map)
}

fn parse_operators(map: &Map<String, Value>) -> QueryResult<Vec<FieldOp>> {
    let mut ops = Vec::with_capacity(map.len());
    for (key, operand) in map {
        let op = match key.as_str() {
            "$eq" => FieldOp::Eq(operand.clone()),
            "$ne" => FieldOp::Ne(operand.clone()),
            "$gt" => FieldOp::Gt(operand.clone()),
            "$gte" => FieldOp::Gte(operand.clone()),
            "$lt" => FieldOp::Lt(operand.clone()),
            "$lte" => FieldOp::Lte(operand.clone()),
            "$in" => FieldOp::In(array_operand(key, operand)?),
            "$nin" => FieldOp::Nin(array_operand(key, operand)?),
            "$exists" => FieldOp::Exists(
                operand
                    .as_bool()
                    .ok_or_else(|| QueryError::operand(key, "expected a boolean"))?,
            ),
            "$regex" => FieldOp::Regex(compile_regex(operand, map.get("$options"))?),
            // Consumed by $regex
            "$options" => {
                if !map.contains_key("$regex") {
                    return Err(QueryError::operand(key, "requires $regex"));
                }
                continue;
            }
            "$size" => FieldOp::Size(
                operand
                    .as_u64()
                    .ok_or_else(|| QueryError::operand(key, "expected a non-negative integer"))?
                    as usize,
            ),
            "$not" => match operand {
                Value::Object(inner) if !inner.is_empty() && inner.keys().all(|k| k.starts_with('$')) => {
                    FieldOp::Not(parse_operators(inner)?)
                }
                _ => return Err(QueryError::operand(key, "expected an operator object")),
            },
            other => return Err(QueryError::UnknownOperator(other.to_string())),
        };
        ops.push(op);
    }
    Ok(ops)
}

fn array_operand(operator: &str, operand: &Value) -> QueryResult<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| QueryError::operand(operator, "expected an array"))
}

fn compile_regex(pattern: &Value, options: Option<&Value>) -> QueryResult<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| QueryError::operand("$regex", "expected a string pattern"))?;

    let flags = match options {
        None => String::new(),
        Some(Value::String(opts)) => {
            if let Some(bad) = opts.chars().find(|c| !matches!(c, 'i' | 'm' | 's' | 'x')) {
                return Err(QueryError::operand("$options", format!("unsupported flag '{}'", bad)));
            }
            opts.clone()
        }
        Some(_) => return Err(QueryError::operand("$options", "expected a string")),
    };

    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    };

    Regex::new(&source).map_err(|e| QueryError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(value: Value) -> QueryCondition {
        QueryCondition::parse(value).unwrap()
    }

    #[test]
    fn test_equality_match() {
        let doc = json!({"name": "Alice", "age": 30});

        assert!(cond(json!({"name": "Alice"})).matches(&doc));
        assert!(!cond(json!({"name": "Bob"})).matches(&doc));
        assert!(cond(json!({"name": "Alice", "age": 30})).matches(&doc));
    }

    #[test]
    fn test_no_type_coercion() {
        let doc = json!({"value": 123});

        assert!(!cond(json!({"value": "123"})).matches(&doc));
        assert!(cond(json!({"value": 123})).matches(&doc));
        assert!(!cond(json!({"value": {"$gt": "100"}})).matches(&doc));
    }

    #[test]
    fn test_range_operators() {
        let doc = json!({"age": 25});

        assert!(cond(json!({"age": {"$gte": 18}})).matches(&doc));
        assert!(cond(json!({"age": {"$lte": 25}})).matches(&doc));
        assert!(!cond(json!({"age": {"$gt": 25}})).matches(&doc));
        assert!(!cond(json!({"age": {"$lt": 25}})).matches(&doc));
        assert!(cond(json!({"age": {"$gt": 20, "$lt": 30}})).matches(&doc));
        assert!(cond(json!({"age": {"$gt": 24.5}})).matches(&doc));
    }

    #[test]
    fn test_missing_field() {
        let doc = json!({"name": "Alice"});

        assert!(!cond(json!({"age": 30})).matches(&doc));
        assert!(cond(json!({"age": null})).matches(&doc));
        assert!(cond(json!({"age": {"$exists": false}})).matches(&doc));
        assert!(cond(json!({"age": {"$ne": 30}})).matches(&doc));
    }

    #[test]
    fn test_nested_paths_and_arrays() {
        let doc = json!({"address": {"city": "Oslo"}, "tags": ["a", "b"]});

        assert!(cond(json!({"address.city": "Oslo"})).matches(&doc));
        assert!(cond(json!({"tags.1": "b"})).matches(&doc));
        assert!(cond(json!({"tags": "a"})).matches(&doc));
        assert!(cond(json!({"tags": {"$size": 2}})).matches(&doc));
        assert!(!cond(json!({"tags": "c"})).matches(&doc));
    }

    #[test]
    fn test_in_and_nin() {
        let doc = json!({"status": "active"});

        assert!(cond(json!({"status": {"$in": ["active", "pending"]}})).matches(&doc));
        assert!(!cond(json!({"status": {"$nin": ["active"]}})).matches(&doc));
    }

    #[test]
    fn test_logical_operators() {
        let doc = json!({"age": 10, "name": "x"});

        assert!(cond(json!({"$or": [{"age": 11}, {"name": "x"}]})).matches(&doc));
        assert!(!cond(json!({"$and": [{"age": 10}, {"name": "y"}]})).matches(&doc));
        assert!(cond(json!({"$nor": [{"age": 11}]})).matches(&doc));
        assert!(cond(json!({"age": {"$not": {"$gt": 50}}})).matches(&doc));
    }

    #[test]
    fn test_regex() {
        let doc = json!({"name": "Johnson"});

        assert!(cond(json!({"name": {"$regex": "son$"}})).matches(&doc));
        assert!(cond(json!({"name": {"$regex": "^john", "$options": "i"}})).matches(&doc));
        assert!(!cond(json!({"name": {"$regex": "^john"}})).matches(&doc));
    }

    #[test]
    fn test_empty_condition_matches_all() {
        let c = cond(json!({}));
        assert!(c.is_empty());
        assert!(c.matches(&json!({"anything": 1})));
        assert!(QueryCondition::match_all().matches(&json!({})));
    }

    #[test]
    fn test_rejects_malformed_conditions() {
        assert!(matches!(
            QueryCondition::parse(json!([1])),
            Err(QueryError::NotAnObject("array"))
        ));
        assert!(matches!(
            QueryCondition::parse(json!({"$where": "x"})),
            Err(QueryError::UnknownOperator(_))
        ));
        assert!(matches!(
            QueryCondition::parse(json!({"a": {"$in": 1}})),
            Err(QueryError::InvalidOperand { .. })
        ));
        assert!(matches!(
            QueryCondition::parse(json!({"a": {"$gt": 1, "b": 2}})),
            Err(QueryError::MixedOperators(_))
        ));
        assert!(matches!(
            QueryCondition::parse(json!({"a": {"$regex": "("}})),
            Err(QueryError::InvalidRegex { .. })
        ));
    }
}
