//! Expression AST

use serde_json::Value;

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal JSON value
    Literal(Value),
    /// `$`, the value the expression is evaluated against
    Input,
    /// `.name` access (also `.length` on arrays and strings)
    Member(Box<Expr>, String),
    /// `[expr]` access
    Index(Box<Expr>, Box<Expr>),
    /// `{ key: expr, ...spread }`
    Object(Vec<ObjectEntry>),
    /// `[expr, ...spread]`
    Array(Vec<ArrayItem>),
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    /// Short-circuiting `&&`, `||`, `??`
    Logical(Box<Expr>, LogicalOp, Box<Expr>),
    /// `cond ? then : otherwise`
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `collection.<method>(args)`
    Call(CollectionMethod, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEntry {
    Field(String, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayItem {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

/// Methods callable on the `collection` binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionMethod {
    Search,
    SearchOne,
    GetById,
}

impl CollectionMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "search" => Some(CollectionMethod::Search),
            "searchOne" => Some(CollectionMethod::SearchOne),
            "getById" => Some(CollectionMethod::GetById),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CollectionMethod::Search => "search",
            CollectionMethod::SearchOne => "searchOne",
            CollectionMethod::GetById => "getById",
        }
    }

    /// Accepted argument counts as (min, max)
    pub fn arity(&self) -> (usize, usize) {
        match self {
            CollectionMethod::Search | CollectionMethod::SearchOne => (0, 1),
            CollectionMethod::GetById => (1, 1),
        }
    }
}

impl Expr {
    /// Returns true if evaluating this expression may call into a collection
    #[cfg(test)]
    pub(crate) fn uses_collection(&self) -> bool {
        match self {
            Expr::Literal(_) | Expr::Input => false,
            Expr::Call(..) => true,
            Expr::Member(base, _) => base.uses_collection(),
            Expr::Index(base, index) => base.uses_collection() || index.uses_collection(),
            Expr::Object(entries) => entries.iter().any(|e| match e {
                ObjectEntry::Field(_, expr) | ObjectEntry::Spread(expr) => expr.uses_collection(),
            }),
            Expr::Array(items) => items.iter().any(|i| match i {
                ArrayItem::Item(expr) | ArrayItem::Spread(expr) => expr.uses_collection(),
            }),
            Expr::Unary(_, operand) => operand.uses_collection(),
            Expr::Binary(l, _, r) | Expr::Logical(l, _, r) => {
                l.uses_collection() || r.uses_collection()
            }
            Expr::Conditional(c, t, o) => {
                c.uses_collection() || t.uses_collection() || o.uses_collection()
            }
        }
    }
}
