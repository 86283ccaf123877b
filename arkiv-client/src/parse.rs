//! Recursive-descent parser for predicate text.
//!
//! ```text
//! expr    := or
//! or      := and ("OR" and)*
//! and     := unary ("AND" unary)*
//! unary   := "NOT" unary | "(" expr ")" | compare
//! compare := ident op literal
//! ```
//!
//! Keywords are case-insensitive; `&&` and `||` are accepted for `AND` and
//! `OR`. The literal's form decides the attribute's kind.

use crate::error::{ClientError, ClientResult};
use crate::expr::{CompareOp, Expr, is_name_char};
use arkiv_types::AttributeValue;
use std::iter::Peekable;
use std::str::CharIndices;

/// Deepest nesting of `NOT` and parentheses a predicate may use.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Int(u64),
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier {name:?}"),
            Self::Str(s) => format!("string {s:?}"),
            Self::Int(n) => format!("number {n}"),
            Self::Op(op) => format!("operator {op}"),
            Self::And => "AND".to_string(),
            Self::Or => "OR".to_string(),
            Self::Not => "NOT".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
        }
    }
}

/// Parses predicate text into an expression tree.
pub(crate) fn parse(text: &str) -> ClientResult<Expr> {
    let tokens = tokenize(text).map_err(|reason| malformed(text, reason))?;
    let mut parser = Parser {
        text,
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(malformed(
            text,
            format!("unexpected {} after expression", token.describe()),
        )),
    }
}

fn malformed(text: &str, reason: impl Into<String>) -> ClientError {
    ClientError::MalformedPredicate {
        predicate: text.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(pos, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(read_string(&mut chars, pos)?));
            }
            '0'..='9' => {
                let digits = take_while(&mut chars, |c| c.is_ascii_digit());
                let n = digits
                    .parse::<u64>()
                    .map_err(|_| format!("integer literal {digits} out of range at offset {pos}"))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                chars.next();
                let mut word = c.to_string();
                word.push_str(&take_while(&mut chars, is_name_char));
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
            '&' | '|' => {
                chars.next();
                if chars.next_if(|&(_, next)| next == ch).is_none() {
                    return Err(format!("expected '{ch}{ch}' at offset {pos}"));
                }
                tokens.push(if ch == '&' { Token::And } else { Token::Or });
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(CompareOp::Eq));
            }
            '~' => {
                chars.next();
                tokens.push(Token::Op(CompareOp::Glob));
            }
            '!' => {
                chars.next();
                if chars.next_if(|&(_, next)| next == '=').is_none() {
                    return Err(format!("expected '!=' at offset {pos}"));
                }
                tokens.push(Token::Op(CompareOp::Ne));
            }
            '<' | '>' => {
                chars.next();
                let or_equal = chars.next_if(|&(_, next)| next == '=').is_some();
                tokens.push(Token::Op(match (ch, or_equal) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    (_, false) => CompareOp::Gt,
                    (_, true) => CompareOp::Ge,
                }));
            }
            other => return Err(format!("unexpected character {other:?} at offset {pos}")),
        }
    }
    Ok(tokens)
}

fn take_while(chars: &mut Peekable<CharIndices<'_>>, pred: impl Fn(char) -> bool) -> String {
    let mut out = String::new();
    while let Some((_, c)) = chars.next_if(|&(_, c)| pred(c)) {
        out.push(c);
    }
    out
}

/// Reads a string literal body; the opening quote is already consumed.
fn read_string(chars: &mut Peekable<CharIndices<'_>>, start: usize) -> Result<String, String> {
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err(format!("unterminated string starting at offset {start}")),
            Some((_, '"')) => return Ok(out),
            Some((pos, '\\')) => match chars.next() {
                Some((_, c @ ('"' | '\\'))) => out.push(c),
                Some((_, c)) => return Err(format!("invalid escape '\\{c}' at offset {pos}")),
                None => return Err(format!("unterminated string starting at offset {start}")),
            },
            Some((_, c)) => out.push(c),
        }
    }
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, reason: impl Into<String>) -> ClientError {
        malformed(self.text, reason)
    }

    fn unexpected(&self, token: Option<&Token>, wanted: &str) -> ClientError {
        match token {
            Some(t) => self.error(format!("expected {wanted}, found {}", t.describe())),
            None => self.error(format!("expected {wanted}, found end of input")),
        }
    }

    fn or(&mut self) -> ClientResult<Expr> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            lhs = lhs.or(rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> ClientResult<Expr> {
        let mut lhs = self.unary()?;
        while self.eat(&Token::And) {
            let rhs = self.unary()?;
            lhs = lhs.and(rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> ClientResult<Expr> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::unary)?;
            return Ok(inner.not());
        }
        if self.eat(&Token::LParen) {
            let inner = self.nested(Self::or)?;
            if !self.eat(&Token::RParen) {
                return Err(self.unexpected(self.peek(), "')'"));
            }
            return Ok(inner);
        }
        self.compare()
    }

    fn nested(&mut self, rule: fn(&mut Self) -> ClientResult<Expr>) -> ClientResult<Expr> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("nesting too deep (limit {MAX_DEPTH})")));
        }
        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }

    fn compare(&mut self) -> ClientResult<Expr> {
        let name = match self.advance() {
            Some(Token::Ident(name)) => name,
            other => return Err(self.unexpected(other.as_ref(), "attribute name")),
        };
        let op = match self.advance() {
            Some(Token::Op(op)) => op,
            other => return Err(self.unexpected(other.as_ref(), "comparison operator")),
        };
        let literal = match self.advance() {
            Some(Token::Str(s)) => AttributeValue::Str(s),
            Some(Token::Int(n)) => AttributeValue::Int(n),
            other => return Err(self.unexpected(other.as_ref(), "literal")),
        };
        Expr::compare(name, literal.kind(), op, literal)
    }
}
