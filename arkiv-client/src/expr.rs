//! Typed filter expressions and their lowering to predicate text.
//!
//! An [`Expr`] is an immutable tree of attribute comparisons joined by
//! `AND`, `OR` and `NOT`. Each comparison fixes the attribute's kind when it
//! is built, so a tree never compares an attribute against a literal of the
//! other kind. Sub-trees are reference counted and can be shared freely
//! between combinators.

use crate::error::{ClientError, ClientResult};
use arkiv_types::{AttributeKind, AttributeValue, Attributes, Entity};
use std::borrow::Cow;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;
use std::sync::Arc;

/// Built-in attribute holding the entity owner's address.
pub const OWNER_ATTRIBUTE: &str = "$owner";

/// Built-in attribute holding the entity key.
pub const KEY_ATTRIBUTE: &str = "$key";

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Glob match (`*` and `?` wildcards). Strings only.
    Glob,
}

impl CompareOp {
    pub const ALL: [CompareOp; 7] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Gt,
        CompareOp::Ge,
        CompareOp::Glob,
    ];

    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Glob => "~",
        }
    }

    /// Whether the operator can be applied to attributes of `kind`.
    #[must_use]
    pub const fn applies_to(self, kind: AttributeKind) -> bool {
        !matches!((self, kind), (Self::Glob, AttributeKind::Int))
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A single attribute comparison, the leaf of an [`Expr`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Comparison {
    name: String,
    kind: AttributeKind,
    op: CompareOp,
    literal: AttributeValue,
}

impl Comparison {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn kind(&self) -> AttributeKind {
        self.kind
    }

    #[must_use]
    pub const fn op(&self) -> CompareOp {
        self.op
    }

    #[must_use]
    pub const fn literal(&self) -> &AttributeValue {
        &self.literal
    }
}

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Compare(Comparison),
    And(Arc<Expr>, Arc<Expr>),
    Or(Arc<Expr>, Arc<Expr>),
    Not(Arc<Expr>),
}

impl Expr {
    /// Builds a comparison leaf, checking the literal against `kind`.
    ///
    /// This is the dynamic entry point; [`IntAttr`] and [`StrAttr`] make the
    /// same checks at compile time.
    pub fn compare(
        name: impl Into<String>,
        kind: AttributeKind,
        op: CompareOp,
        literal: impl Into<AttributeValue>,
    ) -> ClientResult<Self> {
        let name = name.into();
        let literal = literal.into();
        validate_name(&name)?;
        if literal.kind() != kind {
            return Err(ClientError::TypeMismatch {
                attribute: name,
                expected: kind,
                received: literal.kind(),
            });
        }
        if !op.applies_to(kind) {
            return Err(ClientError::InvalidOperator {
                attribute: name,
                operator: op.symbol().to_string(),
                kind,
            });
        }
        Ok(Self::Compare(Comparison {
            name,
            kind,
            op,
            literal,
        }))
    }

    /// Leaf for a name already validated by a typed reference.
    fn leaf(name: &str, kind: AttributeKind, op: CompareOp, literal: AttributeValue) -> Self {
        Self::Compare(Comparison {
            name: name.to_string(),
            kind,
            op,
            literal,
        })
    }

    #[must_use]
    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Arc::new(self), Arc::new(rhs))
    }

    #[must_use]
    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Arc::new(self), Arc::new(rhs))
    }

    #[must_use]
    pub fn not(self) -> Expr {
        Expr::Not(Arc::new(self))
    }

    /// Lowers the tree to predicate text.
    ///
    /// Precedence is `NOT` > `AND` > `OR`. A child is parenthesised when it
    /// binds looser than its parent, or when it is the right operand of an
    /// operator of the same precedence; parsing the output back (left
    /// associative) yields the same tree. The operand of `NOT` is always
    /// parenthesised.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Self::Compare(c) => {
                out.push_str(&c.name);
                out.push(' ');
                out.push_str(c.op.symbol());
                out.push(' ');
                render_literal(&c.literal, out);
            }
            Self::Not(inner) => {
                out.push_str("NOT (");
                inner.render_into(out);
                out.push(')');
            }
            Self::And(lhs, rhs) => self.render_binary(lhs, " AND ", rhs, out),
            Self::Or(lhs, rhs) => self.render_binary(lhs, " OR ", rhs, out),
        }
    }

    fn render_binary(&self, lhs: &Expr, keyword: &str, rhs: &Expr, out: &mut String) {
        let prec = self.precedence();
        render_child(lhs, lhs.precedence() < prec, out);
        out.push_str(keyword);
        render_child(rhs, rhs.precedence() <= prec, out);
    }

    const fn precedence(&self) -> u8 {
        match self {
            Self::Compare(_) => 4,
            Self::Not(_) => 3,
            Self::And(..) => 2,
            Self::Or(..) => 1,
        }
    }

    /// Evaluates the tree against an attribute map.
    ///
    /// A comparison on a missing attribute, or on one holding a value of the
    /// other kind, is false. Built-in attributes are never present here; use
    /// [`Expr::matches`] to include entity metadata.
    #[must_use]
    pub fn evaluate(&self, attributes: &Attributes) -> bool {
        self.eval(&|name| attributes.get(name).map(Cow::Borrowed))
    }

    /// Evaluates the tree against an entity, resolving `$owner` and `$key`
    /// from its metadata.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        self.eval(&|name| match name {
            OWNER_ATTRIBUTE => entity
                .owner
                .map(|o| Cow::Owned(AttributeValue::Str(o.to_string()))),
            KEY_ATTRIBUTE => entity
                .key
                .map(|k| Cow::Owned(AttributeValue::Str(k.to_string()))),
            other => entity.attribute(other).map(Cow::Borrowed),
        })
    }

    fn eval<'a, F>(&self, lookup: &F) -> bool
    where
        F: Fn(&str) -> Option<Cow<'a, AttributeValue>>,
    {
        match self {
            Self::Compare(c) => lookup(&c.name).is_some_and(|value| c.test(&value)),
            Self::And(lhs, rhs) => lhs.eval(lookup) && rhs.eval(lookup),
            Self::Or(lhs, rhs) => lhs.eval(lookup) || rhs.eval(lookup),
            Self::Not(inner) => !inner.eval(lookup),
        }
    }

    /// Parses predicate text into a tree.
    pub fn parse(text: &str) -> ClientResult<Self> {
        crate::parse::parse(text)
    }
}

impl Comparison {
    fn test(&self, value: &AttributeValue) -> bool {
        use std::cmp::Ordering;

        let ordering = match (value, &self.literal) {
            (AttributeValue::Int(v), AttributeValue::Int(l)) => v.cmp(l),
            (AttributeValue::Str(v), AttributeValue::Str(l)) => {
                // Built-ins hold hex, which compares case-insensitively.
                let (v, l) = if self.name.starts_with('$') {
                    (Cow::Owned(v.to_ascii_lowercase()), Cow::Owned(l.to_ascii_lowercase()))
                } else {
                    (Cow::Borrowed(v.as_str()), Cow::Borrowed(l.as_str()))
                };
                if self.op == CompareOp::Glob {
                    return glob_match(l.as_bytes(), v.as_bytes());
                }
                v.cmp(&l)
            }
            _ => return false,
        };
        match self.op {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Glob => ordering == Ordering::Equal,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl FromStr for Expr {
    type Err = ClientError;

    fn from_str(s: &str) -> ClientResult<Self> {
        Self::parse(s)
    }
}

impl BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Expr) -> Expr {
        self.and(rhs)
    }
}

impl BitOr for Expr {
    type Output = Expr;

    fn bitor(self, rhs: Expr) -> Expr {
        self.or(rhs)
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Arc::new(self))
    }
}

fn render_child(child: &Expr, parenthesise: bool, out: &mut String) {
    if parenthesise {
        out.push('(');
        child.render_into(out);
        out.push(')');
    } else {
        child.render_into(out);
    }
}

fn render_literal(literal: &AttributeValue, out: &mut String) {
    match literal {
        AttributeValue::Int(n) => out.push_str(&n.to_string()),
        AttributeValue::Str(s) => {
            out.push('"');
            for ch in s.chars() {
                if ch == '"' || ch == '\\' {
                    out.push('\\');
                }
                out.push(ch);
            }
            out.push('"');
        }
    }
}

/// Checks an attribute name against `[A-Za-z_][A-Za-z0-9_.-]*`, or a
/// `$`-prefixed built-in.
pub(crate) fn validate_name(name: &str) -> ClientResult<()> {
    let body = name.strip_prefix('$').unwrap_or(name);
    let mut chars = body.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(is_name_char) {
        Ok(())
    } else {
        Err(ClientError::InvalidAttributeName(name.to_string()))
    }
}

pub(crate) fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Glob match with `*` (any run) and `?` (any single byte).
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    p = sp + 1;
                    t = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == b'*')
}

// ── Typed attribute references ──────────────────────────────────

/// Reference to an integer attribute. Comparisons only take `u64` literals.
#[derive(Debug, Clone)]
pub struct IntAttr {
    name: String,
}

impl IntAttr {
    pub fn new(name: impl Into<String>) -> ClientResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn cmp(&self, op: CompareOp, value: u64) -> Expr {
        Expr::leaf(&self.name, AttributeKind::Int, op, AttributeValue::Int(value))
    }

    #[must_use]
    pub fn eq(&self, value: u64) -> Expr {
        self.cmp(CompareOp::Eq, value)
    }

    #[must_use]
    pub fn ne(&self, value: u64) -> Expr {
        self.cmp(CompareOp::Ne, value)
    }

    #[must_use]
    pub fn lt(&self, value: u64) -> Expr {
        self.cmp(CompareOp::Lt, value)
    }

    #[must_use]
    pub fn le(&self, value: u64) -> Expr {
        self.cmp(CompareOp::Le, value)
    }

    #[must_use]
    pub fn gt(&self, value: u64) -> Expr {
        self.cmp(CompareOp::Gt, value)
    }

    #[must_use]
    pub fn ge(&self, value: u64) -> Expr {
        self.cmp(CompareOp::Ge, value)
    }
}

/// Reference to a string attribute. Comparisons only take string literals.
#[derive(Debug, Clone)]
pub struct StrAttr {
    name: String,
}

impl StrAttr {
    pub fn new(name: impl Into<String>) -> ClientResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name })
    }

    /// The built-in owner attribute.
    #[must_use]
    pub fn owner() -> Self {
        Self {
            name: OWNER_ATTRIBUTE.to_string(),
        }
    }

    /// The built-in entity key attribute.
    #[must_use]
    pub fn key() -> Self {
        Self {
            name: KEY_ATTRIBUTE.to_string(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn cmp(&self, op: CompareOp, value: impl Into<String>) -> Expr {
        Expr::leaf(&self.name, AttributeKind::Str, op, AttributeValue::Str(value.into()))
    }

    #[must_use]
    pub fn eq(&self, value: impl Into<String>) -> Expr {
        self.cmp(CompareOp::Eq, value)
    }

    #[must_use]
    pub fn ne(&self, value: impl Into<String>) -> Expr {
        self.cmp(CompareOp::Ne, value)
    }

    #[must_use]
    pub fn lt(&self, value: impl Into<String>) -> Expr {
        self.cmp(CompareOp::Lt, value)
    }

    #[must_use]
    pub fn le(&self, value: impl Into<String>) -> Expr {
        self.cmp(CompareOp::Le, value)
    }

    #[must_use]
    pub fn gt(&self, value: impl Into<String>) -> Expr {
        self.cmp(CompareOp::Gt, value)
    }

    #[must_use]
    pub fn ge(&self, value: impl Into<String>) -> Expr {
        self.cmp(CompareOp::Ge, value)
    }

    /// Glob match; `*` matches any run of characters, `?` any single one.
    #[must_use]
    pub fn glob(&self, pattern: impl Into<String>) -> Expr {
        self.cmp(CompareOp::Glob, pattern)
    }
}
