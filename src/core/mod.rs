pub mod accessor;
pub mod pipeline;
pub mod scanner;
pub mod tip;
pub mod writer;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::Result;
use crate::runtime::store::BlockGateway;
use crate::schemas::BlockRecord;
use crate::upstream::ChainSource;
use crate::utils::fmt_duration;

use accessor::BlockAccessor;
use pipeline::FetchPipeline;
use scanner::{BackfillScanner, DEFAULT_CONCURRENCY};
use tip::TipReport;
use writer::WriteQueue;

/// Tuning passed into [`Indexer::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexerConfig {
    pub concurrency: usize,
    pub write_queue_capacity: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self { concurrency: DEFAULT_CONCURRENCY, write_queue_capacity: 1024 }
    }
}

/// The indexing engine: cache-aside reads, backfill passes, and the shared write queue.
pub struct Indexer<S, G> {
    source: Arc<S>,
    gateway: Arc<G>,
    writes: Arc<WriteQueue>,
    pipeline: Arc<FetchPipeline<S>>,
    accessor: BlockAccessor<S, G>,
    scanner: BackfillScanner<S>,
}

impl<S: ChainSource, G: BlockGateway> Indexer<S, G> {
    /// Must be called inside a tokio runtime; spawns the writer task.
    pub fn new(source: Arc<S>, gateway: Arc<G>, cfg: IndexerConfig) -> Self {
        let writes = Arc::new(WriteQueue::spawn(gateway.clone(), cfg.write_queue_capacity));
        let pipeline = Arc::new(FetchPipeline::new(source.clone(), writes.clone()));
        let accessor = BlockAccessor::new(gateway.clone(), pipeline.clone());
        let scanner = BackfillScanner::new(source.clone(), pipeline.clone(), cfg.concurrency);
        Self { source, gateway, writes, pipeline, accessor, scanner }
    }

    /// Stored record for `height`, fetching it from the chain on a miss.
    pub async fn get_block_details(&self, height: u64) -> Result<BlockRecord> {
        self.accessor.get_block_details(height).await
    }

    /// One full sweep of `[min_height, max(max_height, tip)]`. Errors are only logged.
    pub async fn run_backfill_pass(&self, min_height: u64, max_height: u64) {
        self.scanner.run_pass(min_height, max_height).await
    }

    /// Run passes back to back, sleeping `pass_delay` between them, until the handle is aborted.
    /// Passes never overlap. Abort the handle before [`Indexer::shutdown`] so no pass keeps
    /// producing writes into a closed queue.
    pub fn spawn_backfill_loop(
        self: &Arc<Self>,
        min_height: u64,
        max_height: u64,
        pass_delay: Duration,
    ) -> JoinHandle<()> {
        let indexer = self.clone();
        tokio::spawn(async move {
            let mut pass: u64 = 0;
            loop {
                pass += 1;
                let started = Instant::now();
                indexer.run_backfill_pass(min_height, max_height).await;
                info!(pass, "[indexer] pass complete in {}", fmt_duration(started.elapsed()));
                tokio::time::sleep(pass_delay).await;
            }
        })
    }

    /// Fetch `height` from the chain and queue the upsert, bypassing the stored copy.
    pub async fn fetch_and_store(&self, height: u64) -> Result<BlockRecord> {
        self.pipeline.fetch_and_store(height).await
    }

    pub async fn tip_report(&self) -> TipReport {
        tip::tip_report(&*self.source).await
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Wait until every queued write has reached the gateway.
    pub async fn flush(&self) {
        self.writes.flush().await
    }

    /// Apply the writes enqueued before this call, then stop the writer.
    pub async fn shutdown(&self) {
        self.writes.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::store::RocksBlockStore;
    use crate::test_utils::ScriptedChain;
    use tempfile::TempDir;

    #[tokio::test]
    async fn aborted_backfill_loop_stops_fetching() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksBlockStore::open(dir.path()).unwrap());
        let chain = Arc::new(ScriptedChain::new().with_delay(Duration::from_millis(5)));
        let cfg = IndexerConfig { concurrency: 2, write_queue_capacity: 8 };
        let indexer = Arc::new(Indexer::new(chain.clone(), store.clone(), cfg));

        let handle = indexer.spawn_backfill_loop(1, 1_000, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        indexer.shutdown().await;

        let fetched = chain.total_fetches();
        assert!(fetched > 0);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(chain.total_fetches(), fetched);
        assert!(store.count().unwrap() <= fetched);
    }
}
