use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::core::pipeline::FetchPipeline;
use crate::error::{IndexerError, Result};
use crate::runtime::store::{BlockGateway, Lookup};
use crate::schemas::BlockRecord;
use crate::upstream::ChainSource;

type SharedFetch = Shared<BoxFuture<'static, Result<BlockRecord>>>;
type InFlight = Arc<Mutex<HashMap<u64, SharedFetch>>>;

/// Cache-aside reads: the gateway first, the fetch pipeline on a miss.
///
/// Concurrent misses for one height share a single pipeline run.
pub struct BlockAccessor<S, G> {
    gateway: Arc<G>,
    pipeline: Arc<FetchPipeline<S>>,
    inflight: InFlight,
}

fn lock(map: &InFlight) -> MutexGuard<'_, HashMap<u64, SharedFetch>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: ChainSource, G: BlockGateway> BlockAccessor<S, G> {
    pub fn new(gateway: Arc<G>, pipeline: Arc<FetchPipeline<S>>) -> Self {
        Self { gateway, pipeline, inflight: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub async fn get_block_details(&self, height: u64) -> Result<BlockRecord> {
        let gateway = self.gateway.clone();
        let found = tokio::task::spawn_blocking(move || gateway.lookup(height))
            .await
            .map_err(IndexerError::task)??;
        match found {
            Lookup::Found(record) => Ok(record),
            Lookup::NotFound => {
                debug!(height, "[accessor] cache miss, fetching from chain");
                self.fetch_coalesced(height).await
            }
        }
    }

    /// The fetch runs on its own task, so it finishes and clears its map entry even when every
    /// waiter has been dropped.
    async fn fetch_coalesced(&self, height: u64) -> Result<BlockRecord> {
        let fetch = {
            let mut map = lock(&self.inflight);
            match map.get(&height) {
                Some(running) => running.clone(),
                None => {
                    let pipeline = self.pipeline.clone();
                    let inflight = self.inflight.clone();
                    let task = tokio::spawn(async move {
                        let out = pipeline.fetch_and_store(height).await;
                        lock(&inflight).remove(&height);
                        out
                    });
                    let fut = async move {
                        task.await.unwrap_or_else(|e| Err(IndexerError::task(e)))
                    }
                    .boxed()
                    .shared();
                    map.insert(height, fut.clone());
                    fut
                }
            }
        };
        fetch.await
    }

    /// Heights with a fetch currently in progress.
    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }
}
