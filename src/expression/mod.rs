//! Sandboxed expression language
//!
//! Requests carry small snippets of text: placeholder leaves such as
//! `"$.field"` inside join conditions, expose transforms such as
//! `return { age: $.age };`, and join query functions such as
//! `return collection.searchOne({ name: $.field });`.
//!
//! Snippets are compiled into an AST and interpreted. The only things an
//! expression can reach are its input (`$`), literals, pure operators and,
//! for join query functions, the read methods of the joined collection.
//!
//! # Supported syntax
//!
//! - Input and access: `$`, `$.a.b`, `$.items[0]`, `$["key"]`, `.length`
//! - Literals: `42`, `1.5`, `"text"`, `'text'`, `true`, `false`, `null`, `undefined`
//! - Objects and arrays: `{ a: 1, "b c": $.x, ...$ }`, `[1, ...$.list]`
//! - Operators: `! -`, `* / %`, `+ -`, `< <= > >=`, `== != === !==`, `&& || ??`, `?:`
//! - Collection reads: `collection.search(cond?)`, `collection.searchOne(cond?)`,
//!   `collection.getById(id)`; `await` is accepted and ignored

mod ast;
mod errors;
mod eval;
mod lexer;
mod parser;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::collection::CollectionHandle;

pub use ast::{CollectionMethod, Expr};
pub use errors::{ExpressionError, ExpressionResult};

use eval::Evaluator;

/// What an expression may bind besides `$`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionScope {
    /// Only `$` (placeholders, expose transforms)
    Value,
    /// `$` plus `collection` (join query functions)
    Resolver,
}

/// A compiled expression; cheap to clone and share across records
#[derive(Clone)]
pub struct Expression {
    source: Arc<str>,
    ast: Arc<Expr>,
    scope: ExpressionScope,
}

impl Expression {
    /// Compiles source text, failing on any syntax or binding error
    pub fn compile(source: &str, scope: ExpressionScope) -> ExpressionResult<Self> {
        let ast = parser::parse(source, scope == ExpressionScope::Resolver)?;
        Ok(Self {
            source: Arc::from(source),
            ast: Arc::new(ast),
            scope,
        })
    }

    /// Source text the expression was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    #[cfg(test)]
    pub(crate) fn ast(&self) -> &Expr {
        &self.ast
    }

    /// Evaluates against `input` with no collection bound
    pub async fn evaluate(&self, input: &Value) -> ExpressionResult<Value> {
        Evaluator::new(input, None).eval(&self.ast).await
    }

    /// Evaluates against `input` with `collection` bound to `handle`
    pub async fn evaluate_with(
        &self,
        input: &Value,
        handle: &CollectionHandle,
    ) -> ExpressionResult<Value> {
        Evaluator::new(input, Some(handle)).eval(&self.ast).await
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemoryCollection;
    use serde_json::json;

    async fn eval(source: &str, input: Value) -> ExpressionResult<Value> {
        Expression::compile(source, ExpressionScope::Value)?
            .evaluate(&input)
            .await
    }

    fn people() -> CollectionHandle {
        let collection = MemoryCollection::with_records(
            "people",
            vec![
                json!({"_id": "11", "name": "value1", "age": 10}),
                json!({"_id": "12", "name": "value2", "age": 20}),
            ],
        )
        .unwrap();
        CollectionHandle::detached(Arc::new(collection))
    }

    #[tokio::test]
    async fn test_path_access() {
        let record = json!({"field": "value1", "abc": {"anc": [7, 8]}});

        assert_eq!(eval("$.field", record.clone()).await.unwrap(), json!("value1"));
        assert_eq!(eval("$.abc.anc[0]", record.clone()).await.unwrap(), json!(7));
        assert_eq!(eval("$.abc.anc.length", record.clone()).await.unwrap(), json!(2));
        assert_eq!(eval("$['field']", record.clone()).await.unwrap(), json!("value1"));
        assert_eq!(eval("$.missing.deeper", record).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_expose_shapes() {
        let record = json!({"field": "value1", "age": 10, "_id": "1"});

        assert_eq!(
            eval("return { age: $.age };", record.clone()).await.unwrap(),
            json!({"age": 10})
        );
        assert_eq!(
            eval("return {test2:$};", json!([1, 2])).await.unwrap(),
            json!({"test2": [1, 2]})
        );
        assert_eq!(
            eval("({ ...$, age: $.age + 1 })", record).await.unwrap(),
            json!({"field": "value1", "age": 11, "_id": "1"})
        );
    }

    #[tokio::test]
    async fn test_operators() {
        let input = json!({"a": 6, "b": 4, "s": "x", "n": null});

        assert_eq!(eval("$.a * $.b - 1", input.clone()).await.unwrap(), json!(23));
        assert_eq!(eval("$.a / $.b", input.clone()).await.unwrap(), json!(1.5));
        assert_eq!(eval("$.a / 2", input.clone()).await.unwrap(), json!(3));
        assert_eq!(eval("$.s + $.a", input.clone()).await.unwrap(), json!("x6"));
        assert_eq!(eval("$.a > $.b && $.s === 'x'", input.clone()).await.unwrap(), json!(true));
        assert_eq!(eval("$.n ?? 'fallback'", input.clone()).await.unwrap(), json!("fallback"));
        assert_eq!(eval("$.n || $.a", input.clone()).await.unwrap(), json!(6));
        assert_eq!(eval("$.a == 6.0 ? 'six' : 'other'", input.clone()).await.unwrap(), json!("six"));
        assert_eq!(eval("!$.n", input).await.unwrap(), json!(true));
    }

    #[tokio::test]
    async fn test_runtime_type_errors() {
        assert!(matches!(
            eval("$.a - 'x'", json!({"a": 1})).await,
            Err(ExpressionError::Type(_))
        ));
        assert!(matches!(
            eval("$.a / 0", json!({"a": 1})).await,
            Err(ExpressionError::Type(_))
        ));
        assert!(matches!(
            eval("[...$.a]", json!({"a": 1})).await,
            Err(ExpressionError::Type(_))
        ));
    }

    #[tokio::test]
    async fn test_collection_calls() {
        let handle = people();
        let record = json!({"field": "value1"});

        let one = Expression::compile(
            "return collection.searchOne({ name: $.field });",
            ExpressionScope::Resolver,
        )
        .unwrap();
        assert_eq!(
            one.evaluate_with(&record, &handle).await.unwrap(),
            json!({"_id": "11", "name": "value1", "age": 10})
        );

        let many = Expression::compile(
            "await collection.search({ age: { $gte: 10 } })",
            ExpressionScope::Resolver,
        )
        .unwrap();
        assert_eq!(many.evaluate_with(&record, &handle).await.unwrap().as_array().unwrap().len(), 2);

        let by_id = Expression::compile("collection.getById('12').name", ExpressionScope::Resolver).unwrap();
        assert_eq!(by_id.evaluate_with(&record, &handle).await.unwrap(), json!("value2"));
    }

    #[tokio::test]
    async fn test_collection_call_with_bad_condition() {
        let handle = people();
        let expr = Expression::compile("collection.search('name')", ExpressionScope::Resolver).unwrap();

        assert!(matches!(
            expr.evaluate_with(&json!({}), &handle).await,
            Err(ExpressionError::InvalidCondition(_))
        ));
    }

    #[test]
    fn test_value_scope_rejects_collection() {
        let err = Expression::compile("collection.search()", ExpressionScope::Value).unwrap_err();
        assert!(err.is_compile_error());
        assert!(matches!(err, ExpressionError::CollectionNotInScope { .. }));
    }

    #[test]
    fn test_compiled_expression_keeps_source() {
        let expr = Expression::compile("$.a", ExpressionScope::Value).unwrap();
        assert_eq!(expr.source(), "$.a");
        assert!(!expr.ast().uses_collection());
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        for source in [
            format!("{}$", "!".repeat(1_000)),
            format!("{}$.a{}", "(".repeat(1_000), ")".repeat(1_000)),
            format!("{}1{}", "[".repeat(1_000), "]".repeat(1_000)),
            format!("$.a{}", ".b".repeat(1_000)),
            format!("1{}", " + 1".repeat(1_000)),
        ] {
            let err = Expression::compile(&source, ExpressionScope::Value).unwrap_err();
            assert!(err.is_compile_error());
            assert!(err.to_string().contains("nested too deeply"), "{}", err);
        }
    }

    #[tokio::test]
    async fn test_moderate_nesting_still_compiles() {
        let source = format!("{}$.a{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(eval(&source, json!({"a": 3})).await.unwrap(), json!(3));

        let source = format!("{}$.a", "!".repeat(40));
        assert_eq!(eval(&source, json!({"a": 3})).await.unwrap(), json!(true));
    }

    #[test]
    fn test_oversized_source_is_rejected() {
        let source = format!("1{}", " + 1".repeat(20_000));
        let err = Expression::compile(&source, ExpressionScope::Value).unwrap_err();
        assert!(matches!(err, ExpressionError::Syntax { .. }));
        assert!(err.to_string().contains("longer than"), "{}", err);
    }
}
