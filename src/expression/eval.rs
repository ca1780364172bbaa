//! Expression interpreter
//!
//! Evaluation is async because `collection.*` calls suspend on the
//! underlying store. Pure expressions never await anything.

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{Map, Number, Value};

use crate::collection::CollectionHandle;
use crate::query::{kind_of, QueryCondition};

use super::ast::{ArrayItem, BinaryOp, CollectionMethod, Expr, LogicalOp, ObjectEntry, UnaryOp};
use super::errors::{ExpressionError, ExpressionResult};

pub(crate) struct Evaluator<'a> {
    input: &'a Value,
    collection: Option<&'a CollectionHandle>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(input: &'a Value, collection: Option<&'a CollectionHandle>) -> Self {
        Self { input, collection }
    }

    pub(crate) fn eval(&'a self, expr: &'a Expr) -> BoxFuture<'a, ExpressionResult<Value>> {
        async move {
            match expr {
                Expr::Literal(value) => Ok(value.clone()),
                Expr::Input => Ok(self.input.clone()),
                Expr::Member(base, name) => {
                    let base = self.eval(base).await?;
                    Ok(member(&base, name))
                }
                Expr::Index(base, index) => {
                    let base = self.eval(base).await?;
                    let index = self.eval(index).await?;
                    Ok(index_value(&base, &index))
                }
                Expr::Object(entries) => self.object(entries).await,
                Expr::Array(items) => self.array(items).await,
                Expr::Unary(op, operand) => {
                    let value = self.eval(operand).await?;
                    unary(*op, value)
                }
                Expr::Binary(left, op, right) => {
                    let left = self.eval(left).await?;
                    let right = self.eval(right).await?;
                    binary(&left, *op, &right)
                }
                Expr::Logical(left, op, right) => {
                    let left = self.eval(left).await?;
                    let short_circuit = match op {
                        LogicalOp::And => !truthy(&left),
                        LogicalOp::Or => truthy(&left),
                        LogicalOp::Coalesce => !left.is_null(),
                    };
                    if short_circuit {
                        Ok(left)
                    } else {
                        self.eval(right).await
                    }
                }
                Expr::Conditional(condition, then, otherwise) => {
                    if truthy(&self.eval(condition).await?) {
                        self.eval(then).await
                    } else {
                        self.eval(otherwise).await
                    }
                }
                Expr::Call(method, args) => self.call(*method, args).await,
            }
        }
        .boxed()
    }

    async fn object(&'a self, entries: &'a [ObjectEntry]) -> ExpressionResult<Value> {
        let mut object = Map::new();
        for entry in entries {
            match entry {
                ObjectEntry::Field(key, expr) => {
                    let value = self.eval(expr).await?;
                    object.insert(key.clone(), value);
                }
                ObjectEntry::Spread(expr) => match self.eval(expr).await? {
                    Value::Object(fields) => object.extend(fields),
                    Value::Null => {}
                    other => {
                        return Err(ExpressionError::Type(format!(
                            "cannot spread {} into an object",
                            kind_of(&other)
                        )))
                    }
                },
            }
        }
        Ok(Value::Object(object))
    }

    async fn array(&'a self, items: &'a [ArrayItem]) -> ExpressionResult<Value> {
        let mut array = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Item(expr) => array.push(self.eval(expr).await?),
                ArrayItem::Spread(expr) => match self.eval(expr).await? {
                    Value::Array(values) => array.extend(values),
                    other => {
                        return Err(ExpressionError::Type(format!(
                            "cannot spread {} into an array",
                            kind_of(&other)
                        )))
                    }
                },
            }
        }
        Ok(Value::Array(array))
    }

    async fn call(&'a self, method: CollectionMethod, args: &'a [Expr]) -> ExpressionResult<Value> {
        // The parser refuses `collection` unless a handle is bound
        let collection = self.collection.ok_or(ExpressionError::CollectionNotInScope { position: 0 })?;

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg).await?);
        }
        let first = values.into_iter().next();

        match method {
            CollectionMethod::Search => {
                let condition = condition_arg(first)?;
                let records = collection.search(condition.as_ref()).await?;
                Ok(Value::Array(records.into_iter().map(Value::Object).collect()))
            }
            CollectionMethod::SearchOne => {
                let condition = condition_arg(first)?;
                let record = collection.search_one(condition.as_ref()).await?;
                Ok(record.map_or(Value::Null, Value::Object))
            }
            CollectionMethod::GetById => {
                let id = match first {
                    Some(Value::String(id)) => id,
                    Some(Value::Number(n)) => n.to_string(),
                    other => {
                        return Err(ExpressionError::Type(format!(
                            "getById expects a string id, got {}",
                            other.as_ref().map_or("nothing", kind_of)
                        )))
                    }
                };
                let record = collection.get_by_id(&id).await?;
                Ok(record.map_or(Value::Null, Value::Object))
            }
        }
    }
}

fn condition_arg(arg: Option<Value>) -> ExpressionResult<Option<QueryCondition>> {
    match arg {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(QueryCondition::parse(value)?)),
    }
}

fn member(base: &Value, name: &str) -> Value {
    match (base, name) {
        (Value::Object(map), _) => map.get(name).cloned().unwrap_or(Value::Null),
        (Value::Array(items), "length") => Value::from(items.len()),
        (Value::String(s), "length") => Value::from(s.chars().count()),
        _ => Value::Null,
    }
}

fn index_value(base: &Value, index: &Value) -> Value {
    match (base, index) {
        (Value::Object(map), Value::String(key)) => map.get(key).cloned().unwrap_or(Value::Null),
        (Value::Object(map), Value::Number(n)) => {
            map.get(&n.to_string()).cloned().unwrap_or(Value::Null)
        }
        (Value::Array(items), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .cloned()
            .unwrap_or(Value::Null),
        (Value::Array(_), Value::String(key)) if key == "length" => member(base, key),
        (Value::String(s), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| s.chars().nth(i as usize))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn unary(op: UnaryOp, value: Value) -> ExpressionResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
        UnaryOp::Negate => match &value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64().and_then(i64::checked_neg) {
                    Ok(Value::from(i))
                } else {
                    float(-as_f64(n))
                }
            }
            other => Err(ExpressionError::Type(format!(
                "cannot negate {}",
                kind_of(other)
            ))),
        },
    }
}

fn binary(left: &Value, op: BinaryOp, right: &Value) -> ExpressionResult<Value> {
    match op {
        BinaryOp::Equal => Ok(Value::Bool(loose_eq(left, right))),
        BinaryOp::NotEqual => Ok(Value::Bool(!loose_eq(left, right))),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            Ok(Value::Bool(compare(left, op, right)))
        }
        BinaryOp::Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", display(left), display(right))))
            }
            (Value::Number(a), Value::Number(b)) => {
                arithmetic(a, b, i64::checked_add, |x, y| x + y)
            }
            _ => Err(type_error(left, "+", right)),
        },
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Remainder => {
            let (a, b) = match (left, right) {
                (Value::Number(a), Value::Number(b)) => (a, b),
                _ => return Err(type_error(left, symbol(op), right)),
            };
            match op {
                BinaryOp::Subtract => arithmetic(a, b, i64::checked_sub, |x, y| x - y),
                BinaryOp::Multiply => arithmetic(a, b, i64::checked_mul, |x, y| x * y),
                BinaryOp::Divide => {
                    if as_f64(b) == 0.0 {
                        return Err(ExpressionError::Type("division by zero".into()));
                    }
                    // Integer division only when exact
                    let exact = match (a.as_i64(), b.as_i64()) {
                        (Some(x), Some(y)) if x.checked_rem(y) == Some(0) => x.checked_div(y),
                        _ => None,
                    };
                    match exact {
                        Some(quotient) => Ok(Value::from(quotient)),
                        None => float(as_f64(a) / as_f64(b)),
                    }
                }
                _ => {
                    if as_f64(b) == 0.0 {
                        return Err(ExpressionError::Type("division by zero".into()));
                    }
                    arithmetic(a, b, i64::checked_rem, |x, y| x % y)
                }
            }
        }
    }
}

fn arithmetic(
    a: &Number,
    b: &Number,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> ExpressionResult<Value> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(result) = int_op(x, y) {
            return Ok(Value::from(result));
        }
    }
    float(float_op(as_f64(a), as_f64(b)))
}

fn float(value: f64) -> ExpressionResult<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::Type(format!("{} is not representable in JSON", value)))
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

/// Deep equality where numbers compare by value (`10 == 10.0`)
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => as_f64(a) == as_f64(b),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).map_or(false, |w| loose_eq(v, w)))
        }
        _ => left == right,
    }
}

/// Numbers with numbers, strings with strings; anything else is false
fn compare(left: &Value, op: BinaryOp, right: &Value) -> bool {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => as_f64(a).partial_cmp(&as_f64(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        BinaryOp::Less => ordering.is_lt(),
        BinaryOp::LessEqual => ordering.is_le(),
        BinaryOp::Greater => ordering.is_gt(),
        _ => ordering.is_ge(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Remainder => "%",
        _ => "comparison",
    }
}

fn type_error(left: &Value, op: &str, right: &Value) -> ExpressionError {
    ExpressionError::Type(format!(
        "cannot apply '{}' to {} and {}",
        op,
        kind_of(left),
        kind_of(right)
    ))
}
