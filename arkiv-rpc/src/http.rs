//! JSON-RPC over HTTP implementation of [`NodeRpc`].
//!
//! Entity queries go through the node's `arkiv_query` method; block and log
//! access use the standard `eth_*` namespace.

use crate::config::RpcConfig;
use crate::error::{LIMIT_EXCEEDED, METHOD_NOT_FOUND, RpcError, RpcResult};
use crate::node::{FilterId, LogFilter, LogRecord, NodeRpc, QueryPage, QueryRequest, Topic};
use arkiv_types::{
    Address, AttributeKind, Attributes, BlockNumber, BlockTag, Cursor, Entity, EntityKey, Fields,
    SortDirection, TxHash,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// A node reached over HTTP JSON-RPC.
#[derive(Debug)]
pub struct HttpNode {
    config: RpcConfig,
    client: Client,
    next_id: AtomicU64,
}

impl HttpNode {
    /// Creates a node client. Fails only if the HTTP client cannot be built.
    pub fn new(config: RpcConfig) -> RpcResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            config,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint this node talks to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> RpcResult<R> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("rpc call {method} (id {id})");

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error(method, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(format!("{method}: invalid response body: {e}")))?;

        if let Some(err) = envelope.error {
            return Err(classify_node_error(method, err.code, err.message));
        }

        serde_json::from_value(envelope.result.unwrap_or(Value::Null))
            .map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }
}

#[async_trait]
impl NodeRpc for HttpNode {
    async fn query(&self, request: &QueryRequest) -> RpcResult<QueryPage> {
        let options = serde_json::to_value(QueryOptions::from_request(request))?;
        let raw: RawQueryResponse = self
            .call("arkiv_query", json!([request.predicate, options]))
            .await
            .map_err(|e| match e {
                RpcError::Server { code, message } if code != LIMIT_EXCEEDED => {
                    RpcError::QueryRejected {
                        predicate: request.predicate.clone(),
                        message,
                    }
                }
                other => other,
            })?;

        let entities = raw
            .data
            .into_iter()
            .map(|item| item.into_entity(request.fields))
            .collect::<RpcResult<Vec<_>>>()?;
        let block_number = raw.block_number.value("blockNumber")?;
        let cursor = raw.cursor.filter(|c| !c.is_empty()).map(Cursor::new);

        debug!(
            "query page: {} entities at block {block_number}, more: {}",
            entities.len(),
            cursor.is_some()
        );
        Ok(QueryPage {
            entities,
            block_number,
            cursor,
        })
    }

    async fn block_number(&self) -> RpcResult<BlockNumber> {
        let raw: Quantity = self.call("eth_blockNumber", json!([])).await?;
        raw.value("eth_blockNumber")
    }

    async fn get_logs(&self, filter: &LogFilter) -> RpcResult<Vec<LogRecord>> {
        let raw: Vec<RawLog> = self.call("eth_getLogs", json!([filter_json(filter)])).await?;
        raw.into_iter().map(RawLog::into_record).collect()
    }

    async fn new_filter(&self, filter: &LogFilter) -> RpcResult<FilterId> {
        let id: String = self
            .call("eth_newFilter", json!([filter_json(filter)]))
            .await?;
        Ok(FilterId::new(id))
    }

    async fn filter_changes(&self, id: &FilterId) -> RpcResult<Vec<LogRecord>> {
        let raw: Vec<RawLog> = self
            .call("eth_getFilterChanges", json!([id.as_str()]))
            .await?;
        raw.into_iter().map(RawLog::into_record).collect()
    }

    async fn uninstall_filter(&self, id: &FilterId) -> RpcResult<bool> {
        self.call("eth_uninstallFilter", json!([id.as_str()])).await
    }
}

fn classify_send_error(method: &str, e: reqwest::Error) -> RpcError {
    if e.is_timeout() {
        RpcError::Timeout
    } else if e.is_connect() {
        RpcError::Transport(format!("{method}: {e}"))
    } else {
        RpcError::Http(e)
    }
}

fn classify_node_error(method: &str, code: i64, message: String) -> RpcError {
    if code == METHOD_NOT_FOUND {
        RpcError::Unsupported {
            method: method.to_string(),
            message,
        }
    } else if message.to_ascii_lowercase().contains("filter not found") {
        RpcError::FilterNotFound(message)
    } else {
        RpcError::Server { code, message }
    }
}

fn block_tag_json(tag: BlockTag) -> Value {
    match tag {
        BlockTag::Latest => json!("latest"),
        BlockTag::Number(n) => json!(format!("{n:#x}")),
    }
}

fn filter_json(filter: &LogFilter) -> Value {
    let topic0: Vec<String> = filter
        .topics
        .iter()
        .map(|t| format!("0x{}", hex::encode(t)))
        .collect();
    json!({
        "address": filter.address.to_string(),
        "topics": [topic0],
        "fromBlock": block_tag_json(filter.from_block),
        "toBlock": block_tag_json(filter.to_block),
    })
}

fn parse_quantity(text: &str, field: &str) -> RpcResult<u64> {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|e| RpcError::Decode(format!("{field}: invalid quantity {text:?}: {e}")))
}

fn parse_hex_bytes(text: &str, field: &str) -> RpcResult<Vec<u8>> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    hex::decode(digits).map_err(|e| RpcError::Decode(format!("{field}: {e}")))
}

// ── Wire structures ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

/// A numeric field that nodes send either as a JSON number or as a
/// (hex or decimal) string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Quantity {
    Number(u64),
    Text(String),
}

impl Quantity {
    fn value(&self, field: &str) -> RpcResult<u64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => parse_quantity(s, field),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    at_block: Option<u64>,
    include_data: IncludeData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    order_by: Vec<OrderByOption<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    results_per_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<&'a str>,
}

impl<'a> QueryOptions<'a> {
    fn from_request(request: &'a QueryRequest) -> Self {
        Self {
            at_block: request.at_block,
            include_data: IncludeData::from(request.fields),
            order_by: request
                .order_by
                .iter()
                .map(|o| OrderByOption {
                    name: &o.attribute,
                    kind: match o.kind {
                        AttributeKind::Int => "int",
                        AttributeKind::Str => "str",
                    },
                    desc: o.direction == SortDirection::Desc,
                })
                .collect(),
            results_per_page: request.results_per_page,
            cursor: request.cursor.as_ref().map(Cursor::as_str),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IncludeData {
    key: bool,
    // Nodes predating the attributes rename only read `annotations`.
    annotations: bool,
    attributes: bool,
    payload: bool,
    content_type: bool,
    expiration: bool,
    owner: bool,
    created_at_block: bool,
    last_modified_at_block: bool,
}

impl From<Fields> for IncludeData {
    fn from(fields: Fields) -> Self {
        Self {
            key: fields.contains(Fields::KEY),
            annotations: fields.contains(Fields::ATTRIBUTES),
            attributes: fields.contains(Fields::ATTRIBUTES),
            payload: fields.contains(Fields::PAYLOAD),
            content_type: fields.contains(Fields::CONTENT_TYPE),
            expiration: fields.contains(Fields::EXPIRATION),
            owner: fields.contains(Fields::OWNER),
            created_at_block: fields.contains(Fields::CREATED_AT),
            last_modified_at_block: fields.contains(Fields::LAST_MODIFIED_AT),
        }
    }
}

#[derive(Debug, Serialize)]
struct OrderByOption<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    desc: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQueryResponse {
    #[serde(default)]
    data: Vec<RawEntity>,
    block_number: Quantity,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntity {
    #[serde(default)]
    key: Option<EntityKey>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    expires_at: Option<Quantity>,
    #[serde(default)]
    owner: Option<Address>,
    #[serde(default)]
    created_at_block: Option<Quantity>,
    #[serde(default)]
    last_modified_at_block: Option<Quantity>,
    #[serde(default, alias = "stringAnnotations")]
    string_attributes: Option<Vec<RawAttribute<String>>>,
    #[serde(default, alias = "numericAnnotations")]
    numeric_attributes: Option<Vec<RawAttribute<Quantity>>>,
}

#[derive(Debug, Deserialize)]
struct RawAttribute<T> {
    key: String,
    value: T,
}

impl RawEntity {
    fn into_entity(self, fields: Fields) -> RpcResult<Entity> {
        let payload = match self.value {
            Some(hex) => Some(parse_hex_bytes(&hex, "value")?),
            None if fields.contains(Fields::PAYLOAD) => Some(Vec::new()),
            None => None,
        };

        let attributes = if fields.contains(Fields::ATTRIBUTES) {
            let mut attrs = Attributes::new();
            for attr in self.string_attributes.unwrap_or_default() {
                attrs.insert(attr.key, attr.value);
            }
            for attr in self.numeric_attributes.unwrap_or_default() {
                let value = attr.value.value(&attr.key)?;
                attrs.insert(attr.key, value);
            }
            Some(attrs)
        } else {
            None
        };

        Ok(Entity {
            key: self.key,
            owner: self.owner,
            payload,
            content_type: self.content_type,
            attributes,
            created_at_block: self
                .created_at_block
                .map(|q| q.value("createdAtBlock"))
                .transpose()?,
            last_modified_at_block: self
                .last_modified_at_block
                .map(|q| q.value("lastModifiedAtBlock"))
                .transpose()?,
            expires_at_block: self.expires_at.map(|q| q.value("expiresAt")).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    address: Address,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
    #[serde(default)]
    block_number: Option<Quantity>,
    #[serde(default)]
    transaction_hash: Option<TxHash>,
    #[serde(default)]
    log_index: Option<Quantity>,
    #[serde(default)]
    removed: bool,
}

impl RawLog {
    fn into_record(self) -> RpcResult<LogRecord> {
        let topics = self
            .topics
            .iter()
            .map(|t| {
                let bytes = parse_hex_bytes(t, "topic")?;
                Topic::try_from(bytes.as_slice())
                    .map_err(|_| RpcError::Decode(format!("topic {t} is not 32 bytes")))
            })
            .collect::<RpcResult<Vec<_>>>()?;

        Ok(LogRecord {
            address: self.address,
            topics,
            data: parse_hex_bytes(&self.data, "data")?,
            block_number: self
                .block_number
                .map(|q| q.value("blockNumber"))
                .transpose()?,
            transaction_hash: self.transaction_hash,
            log_index: self.log_index.map(|q| q.value("logIndex")).transpose()?,
            removed: self.removed,
        })
    }
}
