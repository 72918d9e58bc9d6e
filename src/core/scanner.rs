use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

use crate::core::pipeline::FetchPipeline;
use crate::core::tip;
use crate::upstream::ChainSource;
use crate::utils::fmt_duration;

/// Default number of fetch units allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Sweeps a height range top-down through the fetch pipeline with at most `concurrency` units
/// running. Keeps no state between passes; every pass rescans its whole window.
pub struct BackfillScanner<S> {
    source: Arc<S>,
    pipeline: Arc<FetchPipeline<S>>,
    concurrency: usize,
}

#[derive(Default)]
struct Tally {
    indexed: u64,
    failed: u64,
}

impl Tally {
    fn record(&mut self, res: Result<bool, JoinError>) {
        match res {
            Ok(true) => self.indexed += 1,
            Ok(false) => self.failed += 1,
            Err(e) => {
                error!(error = %e, "[backfill] fetch unit panicked");
                self.failed += 1;
            }
        }
    }
}

impl<S: ChainSource> BackfillScanner<S> {
    pub fn new(source: Arc<S>, pipeline: Arc<FetchPipeline<S>>, concurrency: usize) -> Self {
        Self { source, pipeline, concurrency: concurrency.max(1) }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Scan `[min_height, max(max_height, tip)]`. Returns once every unit has finished;
    /// per-height failures are logged and skipped.
    pub async fn run_pass(&self, min_height: u64, max_height: u64) {
        let upper = tip::resolve_scan_ceiling(&*self.source, max_height).await;
        if min_height > upper {
            warn!(min_height, upper, "[backfill] empty range, nothing to scan");
            return;
        }

        let started = Instant::now();
        info!(min_height, upper, concurrency = self.concurrency, "[backfill] pass starting");

        let gate = Arc::new(Semaphore::new(self.concurrency));
        let mut units = JoinSet::new();
        let mut tally = Tally::default();

        for height in (min_height..=upper).rev() {
            // wait for a free slot before spawning the next unit
            let Ok(permit) = gate.clone().acquire_owned().await else {
                break;
            };
            let pipeline = self.pipeline.clone();
            units.spawn(async move {
                let _permit = permit;
                match pipeline.fetch_and_store(height).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(height, error = %e, "[backfill] error indexing block");
                        false
                    }
                }
            });

            while let Some(res) = units.try_join_next() {
                tally.record(res);
            }
        }

        while let Some(res) = units.join_next().await {
            tally.record(res);
        }

        info!(
            min_height,
            upper,
            indexed = tally.indexed,
            failed = tally.failed,
            "[backfill] pass finished in {}",
            fmt_duration(started.elapsed())
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::writer::WriteQueue;
    use crate::runtime::store::{BlockGateway, RocksBlockStore};
    use crate::test_utils::ScriptedChain;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        scanner: BackfillScanner<ScriptedChain>,
        chain: Arc<ScriptedChain>,
        store: Arc<RocksBlockStore>,
        writes: Arc<WriteQueue>,
        _dir: TempDir,
    }

    fn setup(chain: ScriptedChain, concurrency: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksBlockStore::open(dir.path()).unwrap());
        let writes = Arc::new(WriteQueue::spawn(store.clone(), 64));
        let chain = Arc::new(chain);
        let pipeline = Arc::new(FetchPipeline::new(chain.clone(), writes.clone()));
        let scanner = BackfillScanner::new(chain.clone(), pipeline, concurrency);
        Fixture { scanner, chain, store, writes, _dir: dir }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_height_visited_once_under_the_cap() {
        let chain = ScriptedChain::new().with_tip(0).with_delay(Duration::from_millis(5));
        let fx = setup(chain, DEFAULT_CONCURRENCY);

        fx.scanner.run_pass(1, 400).await;

        for h in 1..=400 {
            assert_eq!(fx.chain.visits(h), 1, "height {h}");
        }
        assert_eq!(fx.chain.total_fetches(), 400);
        assert!(fx.chain.peak_concurrency() <= DEFAULT_CONCURRENCY);
        assert!(fx.chain.peak_concurrency() > 1);
    }

    #[tokio::test]
    async fn small_cap_is_respected() {
        let chain = ScriptedChain::new().with_tip(0).with_delay(Duration::from_millis(2));
        let fx = setup(chain, 3);

        fx.scanner.run_pass(1, 30).await;

        assert_eq!(fx.chain.total_fetches(), 30);
        assert!(fx.chain.peak_concurrency() <= 3);
    }

    #[tokio::test]
    async fn range_extends_to_higher_tip() {
        let fx = setup(ScriptedChain::new().with_tip(25), 10);

        fx.scanner.run_pass(20, 22).await;
        fx.writes.flush().await;

        assert_eq!(fx.store.indexed_heights().unwrap(), (20..=25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_sweep() {
        let chain = ScriptedChain::new().with_tip(0);
        chain.fail_height(4);
        let fx = setup(chain, 2);

        fx.scanner.run_pass(1, 6).await;
        fx.writes.flush().await;

        assert_eq!(fx.store.indexed_heights().unwrap(), vec![1, 2, 3, 5, 6]);
        assert_eq!(fx.store.count().unwrap(), 5);
    }

    #[tokio::test]
    async fn empty_range_scans_nothing() {
        let fx = setup(ScriptedChain::new().with_tip(0), 4);
        fx.scanner.run_pass(10, 5).await;
        assert_eq!(fx.chain.total_fetches(), 0);
    }
}
