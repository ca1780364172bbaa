//! Tokenizer for expression source text

use serde_json::Number;

use super::errors::{ExpressionError, ExpressionResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Number(Number),
    Str(String),

    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Ellipsis,
    Question,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Nullish,

    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Number(n) => format!("number {}", n),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// A token with the byte offset it starts at
#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Longest source text accepted, in bytes
pub(crate) const MAX_SOURCE_LEN: usize = 64 * 1024;

pub(crate) fn tokenize(source: &str) -> ExpressionResult<Vec<Spanned>> {
    if source.len() > MAX_SOURCE_LEN {
        return Err(ExpressionError::syntax(
            MAX_SOURCE_LEN,
            format!("expression longer than {} bytes", MAX_SOURCE_LEN),
        ));
    }
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, consumed) = match c {
            '{' => (Token::LBrace, 1),
            '}' => (Token::RBrace, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            ',' => (Token::Comma, 1),
            ':' => (Token::Colon, 1),
            ';' => (Token::Semicolon, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '/' => (Token::Slash, 1),
            '%' => (Token::Percent, 1),
            '.' => {
                if next == Some('.') && chars.get(i + 2).map(|(_, c)| *c) == Some('.') {
                    (Token::Ellipsis, 3)
                } else if next.map_or(false, |n| n.is_ascii_digit()) {
                    let (number, len) = lex_number(&chars, i)?;
                    (Token::Number(number), len)
                } else {
                    (Token::Dot, 1)
                }
            }
            '?' => match next {
                Some('?') => (Token::Nullish, 2),
                _ => (Token::Question, 1),
            },
            '!' => match (next, chars.get(i + 2).map(|(_, c)| *c)) {
                (Some('='), Some('=')) => (Token::NotEq, 3),
                (Some('='), _) => (Token::NotEq, 2),
                _ => (Token::Bang, 1),
            },
            '=' => match (next, chars.get(i + 2).map(|(_, c)| *c)) {
                (Some('='), Some('=')) => (Token::EqEq, 3),
                (Some('='), _) => (Token::EqEq, 2),
                _ => return Err(ExpressionError::syntax(position, "assignment is not supported")),
            },
            '<' => match next {
                Some('=') => (Token::Le, 2),
                _ => (Token::Lt, 1),
            },
            '>' => match next {
                Some('=') => (Token::Ge, 2),
                _ => (Token::Gt, 1),
            },
            '&' => match next {
                Some('&') => (Token::AndAnd, 2),
                _ => return Err(ExpressionError::syntax(position, "expected '&&'")),
            },
            '|' => match next {
                Some('|') => (Token::OrOr, 2),
                _ => return Err(ExpressionError::syntax(position, "expected '||'")),
            },
            '"' | '\'' => {
                let (text, len) = lex_string(&chars, i, c)?;
                (Token::Str(text), len)
            }
            c if c.is_ascii_digit() => {
                let (number, len) = lex_number(&chars, i)?;
                (Token::Number(number), len)
            }
            c if is_ident_start(c) => {
                let len = chars[i..]
                    .iter()
                    .take_while(|(_, c)| is_ident_continue(*c))
                    .count();
                let name: String = chars[i..i + len].iter().map(|(_, c)| *c).collect();
                (Token::Ident(name), len)
            }
            other => {
                return Err(ExpressionError::syntax(
                    position,
                    format!("unexpected character '{}'", other),
                ))
            }
        };

        tokens.push(Spanned { token, position });
        i += consumed;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        position: source.len(),
    });
    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn lex_number(chars: &[(usize, char)], start: usize) -> ExpressionResult<(Number, usize)> {
    let mut end = start;
    let mut is_float = false;

    while end < chars.len() && chars[end].1.is_ascii_digit() {
        end += 1;
    }
    if end < chars.len() && chars[end].1 == '.' {
        is_float = true;
        end += 1;
        while end < chars.len() && chars[end].1.is_ascii_digit() {
            end += 1;
        }
    }
    if end < chars.len() && matches!(chars[end].1, 'e' | 'E') {
        is_float = true;
        end += 1;
        if end < chars.len() && matches!(chars[end].1, '+' | '-') {
            end += 1;
        }
        while end < chars.len() && chars[end].1.is_ascii_digit() {
            end += 1;
        }
    }

    let text: String = chars[start..end].iter().map(|(_, c)| *c).collect();
    let position = chars[start].0;

    if !is_float {
        if let Ok(n) = text.parse::<i64>() {
            return Ok((Number::from(n), end - start));
        }
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(|n| (n, end - start))
        .ok_or_else(|| ExpressionError::syntax(position, format!("invalid number '{}'", text)))
}

fn lex_string(
    chars: &[(usize, char)],
    start: usize,
    quote: char,
) -> ExpressionResult<(String, usize)> {
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let (position, c) = chars[i];
        match c {
            c if c == quote => return Ok((text, i - start + 1)),
            '\\' => {
                let (_, escaped) = *chars
                    .get(i + 1)
                    .ok_or_else(|| ExpressionError::syntax(position, "unterminated escape"))?;
                match escaped {
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    '0' => text.push('\0'),
                    'u' => {
                        let hex: String = chars.iter().skip(i + 2).take(4).map(|(_, c)| *c).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == 4)
                            .and_then(char::from_u32)
                            .ok_or_else(|| ExpressionError::syntax(position, "invalid \\u escape"))?;
                        text.push(code);
                        i += 4;
                    }
                    other => text.push(other),
                }
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(ExpressionError::syntax(chars[start].0, "unterminated string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_path_expression() {
        assert_eq!(
            kinds("$.abc.anc[0]"),
            vec![
                Token::Ident("$".into()),
                Token::Dot,
                Token::Ident("abc".into()),
                Token::Dot,
                Token::Ident("anc".into()),
                Token::LBracket,
                Token::Number(Number::from(0)),
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a === b !== c ?? d ...e"),
            vec![
                Token::Ident("a".into()),
                Token::EqEq,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Ident("c".into()),
                Token::Nullish,
                Token::Ident("d".into()),
                Token::Ellipsis,
                Token::Ident("e".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_numbers() {
        assert_eq!(
            kinds(r#"'it\'s' "a\nb" 1.5 2e3 7"#),
            vec![
                Token::Str("it's".into()),
                Token::Str("a\nb".into()),
                Token::Number(Number::from_f64(1.5).unwrap()),
                Token::Number(Number::from_f64(2000.0).unwrap()),
                Token::Number(Number::from(7)),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_errors_carry_position() {
        match tokenize("$.a = 1") {
            Err(ExpressionError::Syntax { position, .. }) => assert_eq!(position, 4),
            other => panic!("expected syntax error, got {:?}", other),
        }
        assert!(tokenize("'open").is_err());
        assert!(tokenize("a # b").is_err());
    }
}
