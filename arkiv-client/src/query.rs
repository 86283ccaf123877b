//! Query descriptors and the fluent builder.

use crate::client::ArkivClient;
use crate::error::{ClientError, ClientResult};
use crate::expr::{Expr, validate_name};
use crate::iterator::QueryIterator;
use arkiv_types::{AttributeKind, BlockNumber, BlockTag, Fields, OrderBy, SortDirection};
use std::collections::HashSet;

/// Predicate text the node treats as "every entity".
pub const MATCH_ALL: &str = "1 = 1";

/// The filter part of a query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Predicate {
    /// Matches every live entity.
    #[default]
    All,
    /// A typed expression tree.
    Expr(Expr),
    /// Caller-supplied text, checked against the grammar when it was set.
    Raw { text: String, parsed: Expr },
}

impl Predicate {
    /// Parses raw predicate text. [`MATCH_ALL`] maps to [`Predicate::All`].
    pub fn raw(text: impl Into<String>) -> ClientResult<Self> {
        let text = text.into();
        if text.trim() == MATCH_ALL {
            return Ok(Self::All);
        }
        let parsed = Expr::parse(&text)?;
        Ok(Self::Raw { text, parsed })
    }

    /// The text sent to the node.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::All => MATCH_ALL.to_string(),
            Self::Expr(expr) => expr.render(),
            Self::Raw { text, .. } => text.clone(),
        }
    }

    /// The expression tree, unless the predicate matches everything.
    #[must_use]
    pub fn expr(&self) -> Option<&Expr> {
        match self {
            Self::All => None,
            Self::Expr(expr) | Self::Raw { parsed: expr, .. } => Some(expr),
        }
    }
}

impl From<Expr> for Predicate {
    fn from(expr: Expr) -> Self {
        Self::Expr(expr)
    }
}

/// A validated, immutable query description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    predicate: Predicate,
    fields: Fields,
    order_by: Vec<OrderBy>,
    page_size: Option<u32>,
    at_block: BlockTag,
    limit: Option<u64>,
}

impl Query {
    /// Starts a builder that is not bound to a client.
    #[must_use]
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new(None, Fields::ALL)
    }

    #[must_use]
    pub const fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    #[must_use]
    pub const fn fields(&self) -> Fields {
        self.fields
    }

    #[must_use]
    pub fn order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Page size hint; `None` defers to the client default.
    #[must_use]
    pub const fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    #[must_use]
    pub const fn at_block(&self) -> BlockTag {
        self.at_block
    }

    /// Maximum number of entities the iterator yields.
    #[must_use]
    pub const fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// The same query returning only entity keys.
    #[must_use]
    pub fn keys_only(&self) -> Self {
        Self {
            fields: Fields::KEY,
            ..self.clone()
        }
    }
}

/// Integer sort key for ORDER BY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntSort {
    name: String,
    direction: SortDirection,
}

impl IntSort {
    /// Ascending by default.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: SortDirection::Asc,
        }
    }

    #[must_use]
    pub fn asc(self) -> Self {
        Self {
            direction: SortDirection::Asc,
            ..self
        }
    }

    #[must_use]
    pub fn desc(self) -> Self {
        Self {
            direction: SortDirection::Desc,
            ..self
        }
    }
}

impl From<IntSort> for OrderBy {
    fn from(sort: IntSort) -> Self {
        OrderBy::new(sort.name, AttributeKind::Int, sort.direction)
    }
}

/// String sort key for ORDER BY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrSort {
    name: String,
    direction: SortDirection,
}

impl StrSort {
    /// Ascending by default.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: SortDirection::Asc,
        }
    }

    #[must_use]
    pub fn asc(self) -> Self {
        Self {
            direction: SortDirection::Asc,
            ..self
        }
    }

    #[must_use]
    pub fn desc(self) -> Self {
        Self {
            direction: SortDirection::Desc,
            ..self
        }
    }
}

impl From<StrSort> for OrderBy {
    fn from(sort: StrSort) -> Self {
        OrderBy::new(sort.name, AttributeKind::Str, sort.direction)
    }
}

/// Fluent construction of a [`Query`].
///
/// Builders obtained from [`ArkivClient::select`] can also run the query
/// directly with [`fetch`](Self::fetch) and [`count`](Self::count).
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    client: Option<ArkivClient>,
    predicate: Predicate,
    fields: Fields,
    order_by: Vec<OrderBy>,
    page_size: Option<u32>,
    at_block: BlockTag,
    limit: Option<u64>,
}

impl QueryBuilder {
    pub(crate) fn new(client: Option<ArkivClient>, fields: Fields) -> Self {
        Self {
            client,
            predicate: Predicate::All,
            fields,
            order_by: Vec::new(),
            page_size: None,
            at_block: BlockTag::Latest,
            limit: None,
        }
    }

    /// Replaces the field selection.
    #[must_use]
    pub fn select(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    /// Filters by a typed expression.
    #[must_use]
    pub fn where_(mut self, expr: Expr) -> Self {
        self.predicate = Predicate::Expr(expr);
        self
    }

    /// Filters by predicate text, which is parsed immediately.
    pub fn where_raw(mut self, text: impl Into<String>) -> ClientResult<Self> {
        self.predicate = Predicate::raw(text)?;
        Ok(self)
    }

    /// Appends a sort key. Earlier keys take priority.
    #[must_use]
    pub fn order_by(mut self, order: impl Into<OrderBy>) -> Self {
        self.order_by.push(order.into());
        self
    }

    #[must_use]
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Evaluates every page against `block` instead of the head.
    #[must_use]
    pub fn at_block(mut self, block: BlockNumber) -> Self {
        self.at_block = BlockTag::Number(block);
        self
    }

    /// Stops iteration after `limit` entities.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Validates the builder into a [`Query`].
    pub fn build(&self) -> ClientResult<Query> {
        if self.fields.is_empty() {
            return Err(ClientError::InvalidQuery(
                "field selection is empty".to_string(),
            ));
        }
        if self.page_size == Some(0) {
            return Err(ClientError::InvalidQuery(
                "page size must be positive".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for order in &self.order_by {
            validate_name(&order.attribute)?;
            if !seen.insert(order.attribute.as_str()) {
                return Err(ClientError::InvalidQuery(format!(
                    "attribute {:?} appears twice in ORDER BY",
                    order.attribute
                )));
            }
        }

        Ok(Query {
            predicate: self.predicate.clone(),
            fields: self.fields,
            order_by: self.order_by.clone(),
            page_size: self.page_size,
            at_block: self.at_block,
            limit: self.limit,
        })
    }

    /// Runs the query, returning a lazy iterator over all matching entities.
    pub fn fetch(self) -> ClientResult<QueryIterator> {
        let query = self.build()?;
        Ok(self.bound_client()?.query(query))
    }

    /// Counts matching entities, transferring only keys.
    pub async fn count(self) -> ClientResult<u64> {
        let query = self.build()?;
        self.bound_client()?.count(&query).await
    }

    fn bound_client(&self) -> ClientResult<&ArkivClient> {
        self.client.as_ref().ok_or_else(|| {
            ClientError::InvalidQuery("query builder is not bound to a client".to_string())
        })
    }
}
