use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::upstream::client::LATEST_BLOCK_PATH;

/// Contents served for one height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockBlock {
    pub hash: String,
    pub proposer: String,
    pub txs: usize,
}

impl MockBlock {
    pub fn new(hash: &str, proposer: &str, txs: usize) -> Self {
        Self { hash: hash.to_string(), proposer: proposer.to_string(), txs }
    }
}

#[derive(Default)]
struct Counters {
    status: AtomicUsize,
    latest: AtomicUsize,
    block_results: AtomicUsize,
    block: AtomicUsize,
}

struct NodeState {
    status_tip: AtomicU64,
    rest_tip: AtomicU64,
    default_block: Mutex<MockBlock>,
    blocks: Mutex<HashMap<u64, MockBlock>>,
    failing_results: Mutex<HashSet<u64>>,
    failing_blocks: Mutex<HashSet<u64>>,
    headless_blocks: Mutex<HashSet<u64>>,
    calls: Counters,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl NodeState {
    fn block_at(&self, height: u64) -> MockBlock {
        guard(&self.blocks)
            .get(&height)
            .cloned()
            .unwrap_or_else(|| guard(&self.default_block).clone())
    }
}

/// Chain node over real HTTP on 127.0.0.1: Tendermint `/status`, `/block_results`, `/block`
/// and the Cosmos REST latest-block route. The server task is aborted on drop.
pub struct MockChainNode {
    addr: SocketAddr,
    state: Arc<NodeState>,
    server: JoinHandle<()>,
}

#[derive(Deserialize)]
struct HeightQuery {
    height: Option<u64>,
}

fn bad_height() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "jsonrpc": "2.0",
            "id": -1,
            "error": {"code": -32603, "message": "height required"}
        })),
    )
}

async fn status(State(s): State<Arc<NodeState>>) -> Json<Value> {
    s.calls.status.fetch_add(1, Ordering::SeqCst);
    let h = s.status_tip.load(Ordering::SeqCst);
    Json(json!({
        "jsonrpc": "2.0",
        "id": -1,
        "result": {"sync_info": {"latest_block_height": h.to_string(), "catching_up": false}}
    }))
}

async fn latest_block(State(s): State<Arc<NodeState>>) -> Json<Value> {
    s.calls.latest.fetch_add(1, Ordering::SeqCst);
    let h = s.rest_tip.load(Ordering::SeqCst);
    Json(json!({"block": {"header": {"height": h.to_string(), "chain_id": "mock-1"}}}))
}

async fn block_results(
    State(s): State<Arc<NodeState>>,
    Query(q): Query<HeightQuery>,
) -> (StatusCode, Json<Value>) {
    s.calls.block_results.fetch_add(1, Ordering::SeqCst);
    let Some(height) = q.height else { return bad_height() };
    if guard(&s.failing_results).contains(&height) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"})));
    }

    let block = s.block_at(height);
    // the node renders an empty result list as null
    let txs = if block.txs == 0 {
        Value::Null
    } else {
        Value::Array(vec![json!({"code": 0, "log": ""}); block.txs])
    };
    (
        StatusCode::OK,
        Json(json!({
            "jsonrpc": "2.0",
            "id": -1,
            "result": {"height": height.to_string(), "txs_results": txs}
        })),
    )
}

async fn block(
    State(s): State<Arc<NodeState>>,
    Query(q): Query<HeightQuery>,
) -> (StatusCode, Json<Value>) {
    s.calls.block.fetch_add(1, Ordering::SeqCst);
    let Some(height) = q.height else { return bad_height() };
    if guard(&s.failing_blocks).contains(&height) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "internal error"})));
    }

    let block = s.block_at(height);
    if guard(&s.headless_blocks).contains(&height) {
        return (
            StatusCode::OK,
            Json(json!({
                "jsonrpc": "2.0",
                "id": -1,
                "result": {
                    "block_id": {"hash": block.hash},
                    "block": {"header": {"height": height.to_string()}}
                }
            })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "jsonrpc": "2.0",
            "id": -1,
            "result": {
                "block_id": {"hash": block.hash},
                "block": {
                    "header": {"height": height.to_string(), "proposer_address": block.proposer}
                }
            }
        })),
    )
}

impl MockChainNode {
    /// Bind an ephemeral port and start serving. Both tips start at `tip`.
    pub async fn start(tip: u64) -> std::io::Result<Self> {
        let state = Arc::new(NodeState {
            status_tip: AtomicU64::new(tip),
            rest_tip: AtomicU64::new(tip),
            default_block: Mutex::new(MockBlock::new("ABC", "P1", 2)),
            blocks: Mutex::new(HashMap::new()),
            failing_results: Mutex::new(HashSet::new()),
            failing_blocks: Mutex::new(HashSet::new()),
            headless_blocks: Mutex::new(HashSet::new()),
            calls: Counters::default(),
        });

        let app = Router::new()
            .route("/status", get(status))
            .route(LATEST_BLOCK_PATH, get(latest_block))
            .route("/block_results", get(block_results))
            .route("/block", get(block))
            .with_state(state.clone());

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });
        Ok(Self { addr, state, server })
    }

    /// Base URL serving both the RPC and REST routes.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_tips(&self, status_tip: u64, rest_tip: u64) {
        self.state.status_tip.store(status_tip, Ordering::SeqCst);
        self.state.rest_tip.store(rest_tip, Ordering::SeqCst);
    }

    /// Block served at every height without an override.
    pub fn set_default_block(&self, block: MockBlock) {
        *guard(&self.state.default_block) = block;
    }

    pub fn set_block(&self, height: u64, block: MockBlock) {
        guard(&self.state.blocks).insert(height, block);
    }

    /// Answer `/block_results` at `height` with HTTP 500.
    pub fn fail_block_results(&self, height: u64) {
        guard(&self.state.failing_results).insert(height);
    }

    /// Answer `/block` at `height` with HTTP 500.
    pub fn fail_block(&self, height: u64) {
        guard(&self.state.failing_blocks).insert(height);
    }

    /// Serve `/block` at `height` without `proposer_address`.
    pub fn omit_proposer(&self, height: u64) {
        guard(&self.state.headless_blocks).insert(height);
    }

    pub fn status_calls(&self) -> usize {
        self.state.calls.status.load(Ordering::SeqCst)
    }

    pub fn latest_block_calls(&self) -> usize {
        self.state.calls.latest.load(Ordering::SeqCst)
    }

    pub fn block_results_calls(&self) -> usize {
        self.state.calls.block_results.load(Ordering::SeqCst)
    }

    pub fn block_calls(&self) -> usize {
        self.state.calls.block.load(Ordering::SeqCst)
    }
}

impl Drop for MockChainNode {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{ChainClient, ChainSource};

    #[tokio::test]
    async fn serves_every_route_the_client_reads() {
        let node = MockChainNode::start(120).await.unwrap();
        node.set_tips(118, 120);
        node.set_block(7, MockBlock::new("EMPTY", "P9", 0));
        let client = ChainClient::new(&node.url(), &node.url(), None).unwrap();

        assert_eq!(client.latest_height_from_status().await.unwrap(), 118);
        assert_eq!(client.latest_height_from_rest().await.unwrap(), 120);
        assert_eq!(client.block_tx_count(5).await.unwrap(), 2);
        assert_eq!(client.block_tx_count(7).await.unwrap(), 0);

        let id = client.block_identity(7).await.unwrap();
        assert_eq!(id.block_id, "EMPTY");
        assert_eq!(id.proposer, "P9");
        assert_eq!(node.block_results_calls(), 2);
        assert_eq!(node.block_calls(), 1);
    }

    #[tokio::test]
    async fn failing_height_is_a_network_error() {
        let node = MockChainNode::start(20).await.unwrap();
        node.fail_block_results(15);
        let client = ChainClient::new(&node.url(), &node.url(), None).unwrap();

        let err = client.block_tx_count(15).await.unwrap_err();
        assert!(matches!(err, crate::error::IndexerError::Network { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn block_route_failures() {
        let node = MockChainNode::start(20).await.unwrap();
        node.fail_block(15);
        node.omit_proposer(16);
        let client = ChainClient::new(&node.url(), &node.url(), None).unwrap();

        let err = client.block_identity(15).await.unwrap_err();
        assert!(matches!(err, crate::error::IndexerError::Network { .. }), "{err:?}");

        match client.block_identity(16).await.unwrap_err() {
            crate::error::IndexerError::FieldMissing { path, .. } => {
                assert_eq!(path, "block.header.proposer_address")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(client.block_identity(17).await.is_ok());
    }
}
