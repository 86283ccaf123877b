//! In-memory node used by the integration tests.

#![allow(dead_code)]

use arkiv_client::{
    Address, AttributeKind, Attributes, BlockNumber, BlockTag, Entity, EntityKey, EventHandler,
    EventPayload, Expr, Fields, LifecycleEvent, MATCH_ALL, SortDirection, TxHash,
};
use arkiv_client::{ClientError, RpcError};
use arkiv_rpc::{
    FilterId, LogFilter, LogRecord, NodeRpc, QueryPage, QueryRequest, RpcResult, encode_log,
};
use arkiv_types::Cursor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const DEFAULT_PAGE: u32 = 50;

#[derive(Default)]
struct MockState {
    entities: Vec<Entity>,
    head: BlockNumber,
    logs: Vec<LogRecord>,
    supports_filters: bool,
    filters: HashMap<FilterId, (LogFilter, BlockNumber)>,
    next_filter: u64,
    reject_queries: bool,
    fail_uninstall: bool,
    transient_failures: u32,
    query_requests: Vec<QueryRequest>,
    get_logs_ranges: Vec<(BlockNumber, BlockNumber)>,
    block_number_calls: u32,
    uninstalled: Vec<FilterId>,
}

/// A node holding entities and logs in memory.
///
/// `get_logs` answers in descending chain order so callers must sort.
#[derive(Default)]
pub struct MockNode {
    state: Mutex<MockState>,
}

impl MockNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_filters() -> Arc<Self> {
        let node = Self::default();
        node.state.lock().unwrap().supports_filters = true;
        Arc::new(node)
    }

    // ── Setup ───────────────────────────────────────────────────

    pub fn insert(&self, key: u8, attributes: Attributes) -> EntityKey {
        let key = EntityKey::from_bytes([key; 32]);
        let mut state = self.state.lock().unwrap();
        let block = state.head;
        state.entities.push(Entity {
            key: Some(key),
            owner: Some(owner()),
            payload: Some(b"payload".to_vec()),
            content_type: Some("text/plain".into()),
            attributes: Some(attributes),
            created_at_block: Some(block),
            last_modified_at_block: Some(block),
            expires_at_block: Some(block + 1_000),
        });
        key
    }

    pub fn set_head(&self, head: BlockNumber) {
        self.state.lock().unwrap().head = head;
    }

    pub fn head(&self) -> BlockNumber {
        self.state.lock().unwrap().head
    }

    /// Records a lifecycle log at `block`, raising the head if needed.
    pub fn emit(&self, block: BlockNumber, key: u8, payload: EventPayload) -> LifecycleEvent {
        let mut state = self.state.lock().unwrap();
        let log_index = state
            .logs
            .iter()
            .filter(|l| l.block_number == Some(block))
            .count() as u64;
        let event = LifecycleEvent {
            key: EntityKey::from_bytes([key; 32]),
            block_number: block,
            tx_hash: TxHash::from_bytes([block as u8; 32]),
            log_index,
            payload,
        };
        state.logs.push(encode_log(&event));
        state.head = state.head.max(block);
        event
    }

    /// Records an arbitrary raw log.
    pub fn emit_raw(&self, log: LogRecord) {
        let mut state = self.state.lock().unwrap();
        if let Some(block) = log.block_number {
            state.head = state.head.max(block);
        }
        state.logs.push(log);
    }

    pub fn set_supports_filters(&self, on: bool) {
        self.state.lock().unwrap().supports_filters = on;
    }

    /// Makes every installed filter unknown to the node.
    pub fn lose_filters(&self) {
        let mut state = self.state.lock().unwrap();
        state.filters.clear();
    }

    pub fn reject_queries(&self) {
        self.state.lock().unwrap().reject_queries = true;
    }

    pub fn fail_uninstall(&self) {
        self.state.lock().unwrap().fail_uninstall = true;
    }

    pub fn allow_uninstall(&self) {
        self.state.lock().unwrap().fail_uninstall = false;
    }

    /// The next `n` calls fail with a transient transport error.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().unwrap().transient_failures = n;
    }

    // ── Inspection ──────────────────────────────────────────────

    pub fn query_requests(&self) -> Vec<QueryRequest> {
        self.state.lock().unwrap().query_requests.clone()
    }

    pub fn get_logs_ranges(&self) -> Vec<(BlockNumber, BlockNumber)> {
        self.state.lock().unwrap().get_logs_ranges.clone()
    }

    pub fn installed_filters(&self) -> usize {
        self.state.lock().unwrap().filters.len()
    }

    pub fn uninstalled(&self) -> Vec<FilterId> {
        self.state.lock().unwrap().uninstalled.clone()
    }

    fn check_failure(state: &mut MockState) -> RpcResult<()> {
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(RpcError::Transport("injected failure".into()));
        }
        Ok(())
    }

    fn resolve(tag: BlockTag, head: BlockNumber) -> BlockNumber {
        tag.number().unwrap_or(head)
    }

    fn matching_logs(
        state: &MockState,
        filter: &LogFilter,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Vec<LogRecord> {
        let mut logs: Vec<LogRecord> = state
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or(0);
                block >= from
                    && block <= to
                    && log.address == filter.address
                    && log
                        .topics
                        .first()
                        .is_none_or(|t| filter.topics.is_empty() || filter.topics.contains(t))
            })
            .cloned()
            .collect();
        logs.sort_by_key(|l| (l.block_number, l.log_index));
        logs
    }
}

fn project(entity: &Entity, fields: Fields) -> Entity {
    Entity {
        key: entity.key.filter(|_| fields.contains(Fields::KEY)),
        owner: entity.owner.filter(|_| fields.contains(Fields::OWNER)),
        payload: entity.payload.clone().filter(|_| fields.contains(Fields::PAYLOAD)),
        content_type: entity
            .content_type
            .clone()
            .filter(|_| fields.contains(Fields::CONTENT_TYPE)),
        attributes: entity
            .attributes
            .clone()
            .filter(|_| fields.contains(Fields::ATTRIBUTES)),
        created_at_block: entity
            .created_at_block
            .filter(|_| fields.contains(Fields::CREATED_AT)),
        last_modified_at_block: entity
            .last_modified_at_block
            .filter(|_| fields.contains(Fields::LAST_MODIFIED_AT)),
        expires_at_block: entity
            .expires_at_block
            .filter(|_| fields.contains(Fields::EXPIRATION)),
    }
}

#[async_trait]
impl NodeRpc for MockNode {
    async fn query(&self, request: &QueryRequest) -> RpcResult<QueryPage> {
        let mut state = self.state.lock().unwrap();
        state.query_requests.push(request.clone());
        Self::check_failure(&mut state)?;
        if state.reject_queries {
            return Err(RpcError::QueryRejected {
                predicate: request.predicate.clone(),
                message: "rejected by node".into(),
            });
        }

        let mut matches: Vec<&Entity> = if request.predicate == MATCH_ALL {
            state.entities.iter().collect()
        } else {
            let expr = Expr::parse(&request.predicate).map_err(|e| RpcError::QueryRejected {
                predicate: request.predicate.clone(),
                message: e.to_string(),
            })?;
            state.entities.iter().filter(|e| expr.matches(e)).collect()
        };
        for order in request.order_by.iter().rev() {
            matches.sort_by(|a, b| {
                let ordering = match order.kind {
                    AttributeKind::Int => {
                        let get = |e: &Entity| e.attribute(&order.attribute).and_then(|v| v.as_int());
                        get(*a).cmp(&get(*b))
                    }
                    AttributeKind::Str => {
                        let get = |e: &Entity| {
                            e.attribute(&order.attribute)
                                .and_then(|v| v.as_str().map(str::to_string))
                        };
                        get(*a).cmp(&get(*b))
                    }
                };
                match order.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let offset: usize = request
            .cursor
            .as_ref()
            .map(|c| c.as_str().parse().unwrap())
            .unwrap_or(0);
        let size = request.results_per_page.unwrap_or(DEFAULT_PAGE) as usize;
        let end = (offset + size).min(matches.len());
        let entities = matches[offset.min(end)..end]
            .iter()
            .map(|e| project(e, request.fields))
            .collect();
        let cursor = (end < matches.len()).then(|| Cursor::new(end.to_string()));

        Ok(QueryPage {
            entities,
            block_number: request.at_block.unwrap_or(state.head),
            cursor,
        })
    }

    async fn block_number(&self) -> RpcResult<BlockNumber> {
        let mut state = self.state.lock().unwrap();
        state.block_number_calls += 1;
        Self::check_failure(&mut state)?;
        Ok(state.head)
    }

    async fn get_logs(&self, filter: &LogFilter) -> RpcResult<Vec<LogRecord>> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        let from = Self::resolve(filter.from_block, state.head);
        let to = Self::resolve(filter.to_block, state.head);
        state.get_logs_ranges.push((from, to));
        let mut logs = Self::matching_logs(&state, filter, from, to);
        logs.reverse();
        Ok(logs)
    }

    async fn new_filter(&self, filter: &LogFilter) -> RpcResult<FilterId> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        if !state.supports_filters {
            return Err(RpcError::Unsupported {
                method: "eth_newFilter".into(),
                message: "filters disabled".into(),
            });
        }
        state.next_filter += 1;
        let id = FilterId::new(format!("0x{:x}", state.next_filter));
        let next_block = match filter.from_block {
            BlockTag::Latest => state.head + 1,
            BlockTag::Number(n) => n,
        };
        state.filters.insert(id.clone(), (filter.clone(), next_block));
        Ok(id)
    }

    async fn filter_changes(&self, id: &FilterId) -> RpcResult<Vec<LogRecord>> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        let head = state.head;
        let Some((filter, next_block)) = state.filters.get(id).cloned() else {
            return Err(RpcError::FilterNotFound(id.to_string()));
        };
        let logs = Self::matching_logs(&state, &filter, next_block, head);
        state.filters.insert(id.clone(), (filter, head + 1));
        Ok(logs)
    }

    async fn uninstall_filter(&self, id: &FilterId) -> RpcResult<bool> {
        let mut state = self.state.lock().unwrap();
        Self::check_failure(&mut state)?;
        if state.fail_uninstall {
            return Err(RpcError::Server {
                code: -32000,
                message: "uninstall failed".into(),
            });
        }
        state.uninstalled.push(id.clone());
        Ok(state.filters.remove(id).is_some())
    }
}

// ── Fixtures ────────────────────────────────────────────────────

pub fn owner() -> Address {
    Address::from_bytes([0x42; 20])
}

pub fn created(expiration_block: BlockNumber) -> EventPayload {
    EventPayload::Created {
        owner: owner(),
        expiration_block,
        cost: 1,
    }
}

pub fn deleted() -> EventPayload {
    EventPayload::Deleted { owner: owner() }
}

/// Records every delivered event and every reported error.
#[derive(Clone, Default)]
pub struct Collector {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl Collector {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn positions(&self) -> Vec<(BlockNumber, u64)> {
        self.events().iter().map(LifecycleEvent::position).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for Collector {
    async fn on_event(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }

    async fn on_error(&self, error: ClientError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}
