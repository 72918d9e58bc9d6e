use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

use crate::core::writer::WriteQueue;
use crate::error::{IndexerError, Result};
use crate::schemas::BlockRecord;
use crate::upstream::ChainSource;

/// Builds one record per height from `block_results` and `block`, then hands it to the write
/// queue without waiting for the write itself.
pub struct FetchPipeline<S> {
    source: Arc<S>,
    writes: Arc<WriteQueue>,
}

impl<S: ChainSource> FetchPipeline<S> {
    pub fn new(source: Arc<S>, writes: Arc<WriteQueue>) -> Self {
        Self { source, writes }
    }

    pub async fn fetch_and_store(&self, height: u64) -> Result<BlockRecord> {
        let record = self.compose(height).await.map_err(|e| IndexerError::fetch(height, e))?;
        self.writes.enqueue(record.clone()).await;
        Ok(record)
    }

    /// Both upstream calls must succeed; nothing partial is returned.
    async fn compose(&self, height: u64) -> Result<BlockRecord> {
        let num_transactions = self.source.block_tx_count(height).await?;
        let identity = self.source.block_identity(height).await?;
        debug!(height, num_transactions, block_id = %identity.block_id, "[pipeline] composed block");

        Ok(BlockRecord::new(
            height,
            identity.block_id,
            identity.proposer,
            num_transactions,
            OffsetDateTime::now_utc(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::store::{BlockGateway, Lookup, RocksBlockStore};
    use crate::test_utils::ScriptedChain;
    use tempfile::TempDir;

    type Fixture = (FetchPipeline<ScriptedChain>, Arc<WriteQueue>, Arc<RocksBlockStore>, TempDir);

    fn setup(chain: ScriptedChain) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksBlockStore::open(dir.path()).unwrap());
        let writes = Arc::new(WriteQueue::spawn(store.clone(), 16));
        (FetchPipeline::new(Arc::new(chain), writes.clone()), writes, store, dir)
    }

    #[tokio::test]
    async fn merges_both_calls_and_persists() {
        let chain = ScriptedChain::new().with_block("ABC", "P1", 2);
        let (pipeline, writes, store, _dir) = setup(chain);

        let rec = pipeline.fetch_and_store(10).await.unwrap();
        assert_eq!(rec.height, 10);
        assert_eq!(rec.block_id, "ABC");
        assert_eq!(rec.proposer, "P1");
        assert_eq!(rec.num_transactions, 2);
        assert_eq!(rec.deleted_at, None);

        writes.flush().await;
        match store.lookup(10).unwrap() {
            Lookup::Found(stored) => assert_eq!(stored.block_id, "ABC"),
            Lookup::NotFound => panic!("record was not persisted"),
        }
    }

    #[tokio::test]
    async fn failed_upstream_call_writes_nothing() {
        let chain = ScriptedChain::new();
        chain.fail_height(15);
        let (pipeline, writes, store, _dir) = setup(chain);

        let err = pipeline.fetch_and_store(15).await.unwrap_err();
        assert!(matches!(err, IndexerError::Fetch { height: 15, .. }));

        writes.flush().await;
        assert_eq!(store.lookup(15).unwrap(), Lookup::NotFound);
    }

    #[tokio::test]
    async fn failed_identity_call_writes_nothing() {
        let chain = ScriptedChain::new().with_block("ABC", "P1", 2);
        chain.fail_identity(16);
        let (pipeline, writes, store, _dir) = setup(chain);

        let err = pipeline.fetch_and_store(16).await.unwrap_err();
        match err {
            IndexerError::Fetch { height, source } => {
                assert_eq!(height, 16);
                assert!(matches!(*source, IndexerError::FieldMissing { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        writes.flush().await;
        assert_eq!(store.lookup(16).unwrap(), Lookup::NotFound);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn refetch_keeps_created_at() {
        let chain = ScriptedChain::new().with_block("ABC", "P1", 2);
        let (pipeline, writes, store, _dir) = setup(chain);

        pipeline.fetch_and_store(3).await.unwrap();
        writes.flush().await;
        let Lookup::Found(first) = store.lookup(3).unwrap() else { panic!("missing row") };

        pipeline.fetch_and_store(3).await.unwrap();
        writes.flush().await;
        let Lookup::Found(second) = store.lookup(3).unwrap() else { panic!("missing row") };

        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(store.count().unwrap(), 1);
    }
}
