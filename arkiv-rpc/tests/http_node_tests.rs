use arkiv_rpc::{
    FilterId, HttpNode, LogFilter, NodeRpc, QueryRequest, RetryPolicy, RpcConfig, RpcError,
    STORAGE_ADDRESS, decode_log, event_topic,
};
use arkiv_types::{BlockTag, Cursor, EventKind, EventPayload, Fields};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn node_for(server: &MockServer) -> HttpNode {
    HttpNode::new(RpcConfig::new(server.uri())).unwrap()
}

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

fn rpc_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": {"code": code, "message": message},
    }))
}

fn word(hex_tail: &str) -> String {
    format!("0x{hex_tail:0>64}")
}

// ── Config ──────────────────────────────────────────────────────

#[test]
fn rpc_config_default() {
    let cfg = RpcConfig::default();
    assert_eq!(cfg.url, "http://127.0.0.1:8545");
    assert_eq!(cfg.request_timeout_ms, 30_000);
}

#[test]
fn rpc_config_serde_fills_defaults() {
    let cfg: RpcConfig = serde_json::from_str(r#"{"url": "http://node:8545"}"#).unwrap();
    assert_eq!(cfg.url, "http://node:8545");
    assert_eq!(cfg.request_timeout_ms, 30_000);
}

#[test]
fn retry_policy_default() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 4);
    assert_eq!(policy.initial_backoff_ms, 200);
    assert_eq!(policy.max_backoff_ms, 5_000);
}

// ── block_number ────────────────────────────────────────────────

#[tokio::test]
async fn block_number_parses_hex() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_blockNumber"})))
        .respond_with(rpc_result(json!("0x2a")))
        .mount(&server)
        .await;

    assert_eq!(node_for(&server).block_number().await.unwrap(), 42);
}

// ── query ───────────────────────────────────────────────────────

#[tokio::test]
async fn query_sends_predicate_and_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "arkiv_query",
            "params": ["type = \"user\"", {"resultsPerPage": 2, "cursor": "abc", "atBlock": 7}],
        })))
        .respond_with(rpc_result(json!({
            "data": [
                {
                    "key": word("01"),
                    "value": "0x68656c6c6f",
                    "contentType": "text/plain",
                    "owner": "0x1111111111111111111111111111111111111111",
                    "expiresAt": 500,
                    "stringAttributes": [{"key": "type", "value": "user"}],
                    "numericAttributes": [{"key": "age", "value": 25}],
                },
            ],
            "blockNumber": "0x7",
            "cursor": "def",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = QueryRequest {
        results_per_page: Some(2),
        cursor: Some(Cursor::new("abc")),
        at_block: Some(7),
        ..QueryRequest::new("type = \"user\"")
    };
    let page = node_for(&server).query(&request).await.unwrap();

    assert_eq!(page.block_number, 7);
    assert_eq!(page.cursor, Some(Cursor::new("def")));
    assert_eq!(page.entities.len(), 1);
    let entity = &page.entities[0];
    assert_eq!(entity.payload.as_deref(), Some(&b"hello"[..]));
    assert_eq!(entity.content_type.as_deref(), Some("text/plain"));
    assert_eq!(entity.expires_at_block, Some(500));
    assert_eq!(entity.attribute("age").and_then(|v| v.as_int()), Some(25));
}

#[tokio::test]
async fn query_empty_cursor_means_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(json!({"data": [], "blockNumber": 3, "cursor": ""})))
        .mount(&server)
        .await;

    let page = node_for(&server)
        .query(&QueryRequest::new("1 = 1"))
        .await
        .unwrap();
    assert!(page.entities.is_empty());
    assert_eq!(page.cursor, None);
}

#[tokio::test]
async fn query_key_only_mask() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "params": ["1 = 1", {"includeData": {
                "key": true,
                "annotations": false,
                "attributes": false,
                "payload": false,
            }}],
        })))
        .respond_with(rpc_result(json!({
            "data": [{"key": word("02")}, {"key": word("03")}],
            "blockNumber": 9,
        })))
        .mount(&server)
        .await;

    let request = QueryRequest {
        fields: Fields::KEY,
        ..QueryRequest::new("1 = 1")
    };
    let page = node_for(&server).query(&request).await.unwrap();
    assert_eq!(page.entities.len(), 2);
    assert!(page.entities.iter().all(|e| e.payload.is_none()));
}

#[tokio::test]
async fn query_node_error_becomes_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_error(-32602, "unknown attribute"))
        .mount(&server)
        .await;

    let err = node_for(&server)
        .query(&QueryRequest::new("nope = 1"))
        .await
        .unwrap_err();
    match err {
        RpcError::QueryRejected { predicate, message } => {
            assert_eq!(predicate, "nope = 1");
            assert_eq!(message, "unknown attribute");
        }
        other => panic!("expected QueryRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn query_rate_limit_stays_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_error(-32005, "limit exceeded"))
        .mount(&server)
        .await;

    let err = node_for(&server)
        .query(&QueryRequest::new("1 = 1"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

// ── HTTP failures ───────────────────────────────────────────────

#[tokio::test]
async fn server_error_status_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = node_for(&server).block_number().await.unwrap_err();
    assert!(matches!(err, RpcError::HttpStatus { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn client_error_status_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
        .mount(&server)
        .await;

    let err = node_for(&server).block_number().await.unwrap_err();
    assert!(!err.is_transient());
}

#[tokio::test]
async fn unreachable_node_is_transport_error() {
    let node = HttpNode::new(RpcConfig {
        url: "http://127.0.0.1:1".into(),
        request_timeout_ms: 2_000,
    })
    .unwrap();
    let err = node.block_number().await.unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err:?}");
}

// ── Filters & logs ──────────────────────────────────────────────

#[tokio::test]
async fn new_filter_unsupported_is_capability_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_newFilter"})))
        .respond_with(rpc_error(-32601, "the method eth_newFilter does not exist"))
        .mount(&server)
        .await;

    let filter = LogFilter::for_kinds(&EventKind::ALL, BlockTag::Number(1), BlockTag::Latest);
    let err = node_for(&server).new_filter(&filter).await.unwrap_err();
    assert!(err.is_capability());
    assert!(matches!(err, RpcError::Unsupported { ref method, .. } if method == "eth_newFilter"));
}

#[tokio::test]
async fn filter_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_newFilter"})))
        .respond_with(rpc_result(json!("0xfeed")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getFilterChanges", "params": ["0xfeed"]})))
        .respond_with(rpc_result(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_uninstallFilter"})))
        .respond_with(rpc_result(json!(true)))
        .mount(&server)
        .await;

    let node = node_for(&server);
    let filter = LogFilter::for_kinds(&[EventKind::Created], BlockTag::Latest, BlockTag::Latest);
    let id = node.new_filter(&filter).await.unwrap();
    assert_eq!(id, FilterId::new("0xfeed"));
    assert!(node.filter_changes(&id).await.unwrap().is_empty());
    assert!(node.uninstall_filter(&id).await.unwrap());
}

#[tokio::test]
async fn filter_changes_unknown_filter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_error(-32000, "filter not found"))
        .mount(&server)
        .await;

    let err = node_for(&server)
        .filter_changes(&FilterId::new("0x1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::FilterNotFound(_)));
}

#[tokio::test]
async fn get_logs_decodes_created_event() {
    let server = MockServer::start().await;
    let topic0 = format!("0x{}", hex::encode(event_topic(EventKind::Created)));
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getLogs",
            "params": [{"fromBlock": "0x5", "toBlock": "0x6"}],
        })))
        .respond_with(rpc_result(json!([{
            "address": STORAGE_ADDRESS.to_string(),
            "topics": [topic0, word("aa"), word("1111111111111111111111111111111111111111")],
            "data": format!("{}{:0>64}", word("03e8"), "05"),
            "blockNumber": "0x6",
            "transactionHash": word("bb"),
            "logIndex": "0x0",
            "removed": false,
        }])))
        .mount(&server)
        .await;

    let filter = LogFilter::for_kinds(&[EventKind::Created], BlockTag::Number(5), BlockTag::Number(6));
    let logs = node_for(&server).get_logs(&filter).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].address, STORAGE_ADDRESS);

    let event = decode_log(&logs[0]).unwrap();
    assert_eq!(event.block_number, 6);
    assert_eq!(event.key.as_bytes()[31], 0xaa);
    match event.payload {
        EventPayload::Created {
            expiration_block,
            cost,
            ..
        } => {
            assert_eq!(expiration_block, 1_000);
            assert_eq!(cost, 5);
        }
        other => panic!("expected Created, got {other:?}"),
    }
}
