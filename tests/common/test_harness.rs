//! Full integration harness: a mock chain node served over HTTP, the real HTTP client, and a
//! RocksDB store in a temporary directory.

use anyhow::Result;
use blockmirror::config::AppConfig;
use blockmirror::core::Indexer;
use blockmirror::runtime::store::{BlockGateway, Lookup, RocksBlockStore};
use blockmirror::schemas::BlockRecord;
use blockmirror::test_utils::{MockChainNode, TestConfigBuilder};
use blockmirror::upstream::ChainClient;
use std::sync::Arc;
use tempfile::TempDir;

pub struct IndexerHarness {
    pub node: MockChainNode,
    pub config: AppConfig,
    pub indexer: Arc<Indexer<ChainClient, RocksBlockStore>>,

    // Resource cleanup
    _temp_dirs: Vec<TempDir>,
}

#[allow(dead_code)]
impl IndexerHarness {
    /// Node tip at `tip`, scan window `[min_height, max_height]`.
    pub async fn new(tip: u64, min_height: u64, max_height: u64) -> Result<Self> {
        let node = MockChainNode::start(tip).await?;
        let (config, temp_dirs) = TestConfigBuilder::new()
            .with_node_url(&node.url())
            .with_range(min_height, max_height)
            .with_view_only(false)
            .build();
        config.validate()?;

        let store = Arc::new(RocksBlockStore::open(&config.db_path)?);
        let timeout = config.upstream_timeout();
        let client = Arc::new(ChainClient::new(&config.rpc_url, &config.rest_url, timeout)?);
        let indexer = Arc::new(Indexer::new(client, store, config.indexer_config()));

        Ok(Self { node, config, indexer, _temp_dirs: temp_dirs })
    }

    /// One backfill pass over the configured window, then wait for its writes.
    pub async fn run_pass(&self) {
        self.indexer.run_backfill_pass(self.config.min_height, self.config.max_height).await;
        self.indexer.flush().await;
    }

    pub fn stored(&self, height: u64) -> Option<BlockRecord> {
        match self.indexer.gateway().lookup(height).expect("lookup") {
            Lookup::Found(rec) => Some(rec),
            Lookup::NotFound => None,
        }
    }

    pub fn heights(&self) -> Vec<u64> {
        self.indexer.gateway().indexed_heights().expect("indexed heights")
    }
}
