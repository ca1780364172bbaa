//! Recursive-descent parser
//!
//! Precedence, lowest first:
//! `?:`, `??`, `||`, `&&`, `== !=`, `< <= > >=`, `+ -`, `* / %`,
//! unary `! - await`, postfix `.name [index] (call)`.

use serde_json::{Number, Value};

use super::ast::{ArrayItem, BinaryOp, CollectionMethod, Expr, LogicalOp, ObjectEntry, UnaryOp};
use super::errors::{ExpressionError, ExpressionResult};
use super::lexer::{tokenize, Spanned, Token};

/// Deepest expression tree the parser builds
pub(crate) const MAX_DEPTH: usize = 128;

/// Parses a full expression body: `[return] expr [;]`
pub(crate) fn parse(source: &str, allow_collection: bool) -> ExpressionResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        allow_collection,
    };

    if parser.peek_ident("return") {
        parser.advance();
    }
    let expr = parser.expression()?;
    if parser.peek() == &Token::Semicolon {
        parser.advance();
    }
    parser.expect(Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    allow_collection: bool,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn position(&self) -> usize {
        self.tokens[self.pos].position
    }

    fn peek_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Token::Ident(n) if n == name)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ExpressionResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{:?}", token)))
        }
    }

    fn unexpected(&self, wanted: &str) -> ExpressionError {
        ExpressionError::syntax(
            self.position(),
            format!("expected {}, found {}", wanted, self.peek().describe()),
        )
    }

    /// One level deeper in the tree being built
    fn nest(&mut self) -> ExpressionResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::syntax(
                self.position(),
                "expression nested too deeply",
            ));
        }
        Ok(())
    }

    fn expression(&mut self) -> ExpressionResult<Expr> {
        self.nest()?;
        let expr = self.conditional()?;
        self.depth -= 1;
        Ok(expr)
    }

    fn conditional(&mut self) -> ExpressionResult<Expr> {
        let condition = self.logical(0)?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.expression()?;
        self.expect(Token::Colon)?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    /// Levels: 0 = `??`, 1 = `||`, 2 = `&&`
    fn logical(&mut self, level: u8) -> ExpressionResult<Expr> {
        let (token, op) = match level {
            0 => (Token::Nullish, LogicalOp::Coalesce),
            1 => (Token::OrOr, LogicalOp::Or),
            2 => (Token::AndAnd, LogicalOp::And),
            _ => return self.equality(),
        };

        let base = self.depth;
        let mut left = self.logical(level + 1)?;
        while self.eat(&token) {
            self.nest()?;
            let right = self.logical(level + 1)?;
            left = Expr::Logical(Box::new(left), op, Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn equality(&mut self) -> ExpressionResult<Expr> {
        let base = self.depth;
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinaryOp::Equal,
                Token::NotEq => BinaryOp::NotEqual,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.nest()?;
            let right = self.relational()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn relational(&mut self) -> ExpressionResult<Expr> {
        let base = self.depth;
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinaryOp::Less,
                Token::Le => BinaryOp::LessEqual,
                Token::Gt => BinaryOp::Greater,
                Token::Ge => BinaryOp::GreaterEqual,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.nest()?;
            let right = self.additive()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn additive(&mut self) -> ExpressionResult<Expr> {
        let base = self.depth;
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Subtract,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.nest()?;
            let right = self.multiplicative()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> ExpressionResult<Expr> {
        let base = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Multiply,
                Token::Slash => BinaryOp::Divide,
                Token::Percent => BinaryOp::Remainder,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.nest()?;
            let right = self.unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn unary(&mut self) -> ExpressionResult<Expr> {
        match self.peek() {
            Token::Bang => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.operand()?)))
            }
            Token::Minus => {
                self.advance();
                Ok(Expr::Unary(UnaryOp::Negate, Box::new(self.operand()?)))
            }
            // Collection calls are awaited implicitly
            Token::Ident(name) if name == "await" => {
                self.advance();
                self.operand()
            }
            _ => self.postfix(),
        }
    }

    fn operand(&mut self) -> ExpressionResult<Expr> {
        self.nest()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(operand)
    }

    fn postfix(&mut self) -> ExpressionResult<Expr> {
        if self.peek_ident("collection") {
            return self.collection_call();
        }

        let base = self.depth;
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    self.nest()?;
                    let name = self.member_name()?;
                    expr = Expr::Member(Box::new(expr), name);
                }
                Token::LBracket => {
                    self.advance();
                    self.nest()?;
                    let index = self.expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Token::LParen => {
                    return Err(ExpressionError::syntax(
                        self.position(),
                        "only collection methods can be called",
                    ))
                }
                _ => {
                    self.depth = base;
                    return Ok(expr);
                }
            }
        }
    }

    fn member_name(&mut self) -> ExpressionResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("property name")),
        }
    }

    fn collection_call(&mut self) -> ExpressionResult<Expr> {
        let position = self.position();
        if !self.allow_collection {
            return Err(ExpressionError::CollectionNotInScope { position });
        }
        self.advance();
        self.expect(Token::Dot)?;

        let method_position = self.position();
        let name = self.member_name()?;
        let method = CollectionMethod::from_name(&name).ok_or(ExpressionError::UnknownMethod {
            name,
            position: method_position,
        })?;

        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect(Token::Comma)?;
                // Trailing comma
                if self.eat(&Token::RParen) {
                    break;
                }
            }
        }

        let (min, max) = method.arity();
        if args.len() < min || args.len() > max {
            return Err(ExpressionError::Arity {
                method: method.name(),
                expected: if min == max { "1" } else { "0 or 1" },
                actual: args.len(),
            });
        }

        let call = Expr::Call(method, args);
        self.postfix_tail(call)
    }

    /// Member and index access after a call result
    fn postfix_tail(&mut self, mut expr: Expr) -> ExpressionResult<Expr> {
        let base = self.depth;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    self.nest()?;
                    let name = self.member_name()?;
                    expr = Expr::Member(Box::new(expr), name);
                }
                Token::LBracket => {
                    self.advance();
                    self.nest()?;
                    let index = self.expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => {
                    self.depth = base;
                    return Ok(expr);
                }
            }
        }
    }

    fn primary(&mut self) -> ExpressionResult<Expr> {
        let position = self.position();
        let token = self.peek().clone();
        if token == Token::Eof {
            return Err(self.unexpected("expression"));
        }
        self.advance();
        match token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBrace => self.object_literal(),
            Token::LBracket => self.array_literal(),
            Token::Ident(name) => match name.as_str() {
                "$" => Ok(Expr::Input),
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
                other => Err(ExpressionError::UnknownIdentifier {
                    name: other.to_string(),
                    position,
                }),
            },
            _ => {
                self.pos -= 1;
                Err(self.unexpected("expression"))
            }
        }
    }

    fn object_literal(&mut self) -> ExpressionResult<Expr> {
        let mut entries = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.eat(&Token::Ellipsis) {
                entries.push(ObjectEntry::Spread(self.expression()?));
            } else {
                let key = match self.peek().clone() {
                    Token::Ident(name) => name,
                    Token::Str(s) => s,
                    Token::Number(n) => number_key(&n),
                    _ => return Err(self.unexpected("property key")),
                };
                self.advance();
                self.expect(Token::Colon)?;
                entries.push(ObjectEntry::Field(key, self.expression()?));
            }

            if !self.eat(&Token::Comma) {
                self.expect(Token::RBrace)?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }

    fn array_literal(&mut self) -> ExpressionResult<Expr> {
        let mut items = Vec::new();
        while !self.eat(&Token::RBracket) {
            if self.eat(&Token::Ellipsis) {
                items.push(ArrayItem::Spread(self.expression()?));
            } else {
                items.push(ArrayItem::Item(self.expression()?));
            }

            if !self.eat(&Token::Comma) {
                self.expect(Token::RBracket)?;
                break;
            }
        }
        Ok(Expr::Array(items))
    }
}

fn number_key(n: &Number) -> String {
    n.to_string()
}
